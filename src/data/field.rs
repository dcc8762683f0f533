//! Mesh-resident per-entity values.
//!
//! A `Field` stores `num_components` contiguous `f64`s per entity, addressed
//! by the entity's local offset. It is the source of Dirichlet values and
//! the destination of solution copy-back.

use crate::linsys_error::LinSysError;
use crate::topology::entity::MeshEntity;

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    name: String,
    num_components: usize,
    data: Vec<f64>,
}

impl Field {
    /// Zero-initialised field covering offsets `0..capacity`.
    pub fn new(name: impl Into<String>, capacity: usize, num_components: usize) -> Self {
        Self {
            name: name.into(),
            num_components,
            data: vec![0.0; capacity * num_components],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_components(&self) -> usize {
        self.num_components
    }

    /// Number of entity slots.
    pub fn capacity(&self) -> usize {
        self.data.len() / self.num_components.max(1)
    }

    /// Grow to cover offsets `0..capacity`, zero-filling new slots.
    pub fn resize(&mut self, capacity: usize) {
        self.data.resize(capacity * self.num_components, 0.0);
    }

    fn span(&self, e: MeshEntity) -> Result<std::ops::Range<usize>, LinSysError> {
        let start = e.offset() * self.num_components;
        let end = start + self.num_components;
        if end > self.data.len() {
            return Err(LinSysError::Configuration(format!(
                "field `{}` has no slot for entity {e}",
                self.name
            )));
        }
        Ok(start..end)
    }

    /// Components of `e`.
    pub fn get(&self, e: MeshEntity) -> Result<&[f64], LinSysError> {
        let span = self.span(e)?;
        Ok(&self.data[span])
    }

    pub fn get_mut(&mut self, e: MeshEntity) -> Result<&mut [f64], LinSysError> {
        let span = self.span(e)?;
        Ok(&mut self.data[span])
    }

    /// Overwrite the components of `e`.
    ///
    /// # Errors
    /// `BlockSizeMismatch` if `vals` has the wrong length.
    pub fn set(&mut self, e: MeshEntity, vals: &[f64]) -> Result<(), LinSysError> {
        let n = self.num_components;
        if vals.len() != n {
            return Err(LinSysError::BlockSizeMismatch {
                stage: crate::linsys_error::Stage::Transfer,
                expected: n,
                got: vals.len(),
            });
        }
        self.get_mut(e)?.copy_from_slice(vals);
        Ok(())
    }

    pub fn fill(&mut self, v: f64) {
        self.data.fill(v);
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::entity::EntityId;

    fn ent(off: u32) -> MeshEntity {
        MeshEntity::new(EntityId::new(off as u64 + 1).unwrap(), off)
    }

    #[test]
    fn set_and_get_by_offset() {
        let mut f = Field::new("velocity", 3, 2);
        f.set(ent(1), &[1.0, 2.0]).unwrap();
        assert_eq!(f.get(ent(1)).unwrap(), &[1.0, 2.0]);
        assert_eq!(f.get(ent(0)).unwrap(), &[0.0, 0.0]);
        assert_eq!(f.capacity(), 3);
    }

    #[test]
    fn out_of_range_offset_errors() {
        let f = Field::new("p", 1, 1);
        assert!(matches!(f.get(ent(4)), Err(LinSysError::Configuration(_))));
    }

    #[test]
    fn wrong_width_is_block_mismatch() {
        let mut f = Field::new("p", 2, 1);
        assert!(matches!(
            f.set(ent(0), &[1.0, 2.0]),
            Err(LinSysError::BlockSizeMismatch { expected: 1, got: 2, .. })
        ));
    }

    #[test]
    fn resize_keeps_existing_values() {
        let mut f = Field::new("p", 1, 1);
        f.set(ent(0), &[5.0]).unwrap();
        f.resize(4);
        assert_eq!(f.get(ent(0)).unwrap(), &[5.0]);
        assert_eq!(f.get(ent(3)).unwrap(), &[0.0]);
    }
}
