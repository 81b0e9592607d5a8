use kube::core::CustomResourceExt;
use wp_operator::crd::wordpress::Wordpress;

fn main() -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(&Wordpress::crd())?;
    print!("{yaml}");
    Ok(())
}
