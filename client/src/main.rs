fn main() -> anyhow::Result<()> {
    thiings_client::run()
}
