use metal_cluster::api::scheme::scheme;

fn main() -> anyhow::Result<()> {
    print!("{}", scheme().crds_yaml()?);
    Ok(())
}
