fn main() -> Result<(), Box<dyn std::error::Error>> {
    askliam::cli::main()
}
