fn main() -> anyhow::Result<()> {
    flowtrace_lib::run()
}
