//! Prints the `AccountIAM` CRD as YAML.

use user_management_operator::controller::crdgen;

fn main() {
    match crdgen::generate() {
        Ok(yaml) => print!("{yaml}"),
        Err(e) => {
            eprintln!("{e:#}");
            std::process::exit(1);
        }
    }
}
