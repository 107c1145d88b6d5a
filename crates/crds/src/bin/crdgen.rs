//! Prints the Theia CRD manifest as YAML for cluster installation.

use kube::CustomResourceExt;

fn main() {
    let crd = crds::Theia::crd();
    match serde_yaml::to_string(&crd) {
        Ok(yaml) => print!("{yaml}"),
        Err(e) => {
            eprintln!("failed to serialize Theia CRD: {e}");
            std::process::exit(1);
        }
    }
}
