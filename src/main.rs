fn main() -> anyhow::Result<()> {
    space_monkey_lib::run()
}
