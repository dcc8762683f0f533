//! Construction parameters of a [`LinearSystem`](super::system::LinearSystem).
//!
//! Plain serde data: reading it from a file is the caller's business.

use serde::{Deserialize, Serialize};

use crate::algs::communicator::{CommTag, LinSysCommTags};
use crate::linsys_error::LinSysError;

fn default_check_invariants() -> bool {
    cfg!(debug_assertions)
}

fn default_comm_tag_base() -> u16 {
    0xA000
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearSystemConfig {
    /// Equation system name, used in log lines and diagnostics.
    pub name: String,
    /// Degrees of freedom per row entity.
    pub num_dof: usize,
    /// First of the consecutive message tags this system uses.
    #[serde(default = "default_comm_tag_base")]
    pub comm_tag_base: u16,
    /// Validate graph and id-map invariants after every rebuild.
    #[serde(default = "default_check_invariants")]
    pub check_invariants: bool,
}

impl LinearSystemConfig {
    pub fn new(name: impl Into<String>, num_dof: usize) -> Self {
        Self {
            name: name.into(),
            num_dof,
            comm_tag_base: default_comm_tag_base(),
            check_invariants: default_check_invariants(),
        }
    }

    pub fn with_comm_tag_base(mut self, base: u16) -> Self {
        self.comm_tag_base = base;
        self
    }

    pub fn with_check_invariants(mut self, on: bool) -> Self {
        self.check_invariants = on;
        self
    }

    /// # Errors
    /// `Configuration` if `num_dof` is zero or the tag range would wrap.
    pub fn validate(&self) -> Result<(), LinSysError> {
        if self.num_dof == 0 {
            return Err(LinSysError::Configuration(format!(
                "system `{}`: num_dof must be at least 1",
                self.name
            )));
        }
        if self
            .comm_tag_base
            .checked_add(LinSysCommTags::SPAN - 1)
            .is_none()
        {
            return Err(LinSysError::Configuration(format!(
                "system `{}`: comm_tag_base {:#x} leaves no room for {} tags",
                self.name,
                self.comm_tag_base,
                LinSysCommTags::SPAN
            )));
        }
        Ok(())
    }

    pub fn tags(&self) -> LinSysCommTags {
        LinSysCommTags::from_base(CommTag::new(self.comm_tag_base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_defaults() {
        let cfg: LinearSystemConfig =
            serde_json::from_str(r#"{ "name": "momentum", "num_dof": 3 }"#).unwrap();
        assert_eq!(cfg.name, "momentum");
        assert_eq!(cfg.num_dof, 3);
        assert_eq!(cfg.comm_tag_base, 0xA000);
        cfg.validate().unwrap();
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let res: Result<LinearSystemConfig, _> =
            serde_json::from_str(r#"{ "name": "p", "num_dof": 1, "ndof": 2 }"#);
        assert!(res.is_err());
    }

    #[test]
    fn zero_dof_fails_validation() {
        let cfg = LinearSystemConfig::new("p", 0);
        assert!(matches!(cfg.validate(), Err(LinSysError::Configuration(_))));
    }

    #[test]
    fn tag_base_must_fit_all_tags() {
        let cfg = LinearSystemConfig::new("p", 1).with_comm_tag_base(u16::MAX - 2);
        assert!(cfg.validate().is_err());
        let cfg = LinearSystemConfig::new("p", 1).with_comm_tag_base(u16::MAX - 3);
        cfg.validate().unwrap();
        assert_eq!(cfg.tags().sync.as_u16(), u16::MAX);
    }
}
