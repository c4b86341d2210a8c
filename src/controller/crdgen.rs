//! # CRD Generator
//!
//! Generates the `AccountIAM` CustomResourceDefinition YAML from the Rust types.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/accountiam.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use crate::crd::AccountIAM;
use anyhow::{Context, Result};
use kube::core::CustomResourceExt;

const HEADER: &str = "# This file is auto-generated by crdgen\n";

/// CRD YAML for `AccountIAM`, prefixed with a generated-file header
pub fn generate() -> Result<String> {
    let yaml = serde_yaml::to_string(&AccountIAM::crd()).context("Failed to serialize CRD to YAML")?;
    Ok(format!("{HEADER}{yaml}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_crd_describes_account_iam() {
        let yaml = generate().unwrap();
        assert!(yaml.starts_with(HEADER));
        assert!(yaml.contains("name: accountiams.operator.ibm.com"));
        assert!(yaml.contains("kind: AccountIAM"));
        assert!(yaml.contains("- aiam"));
    }
}
