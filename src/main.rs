fn main() {
    if let Err(err) = inkstream::cli::main() {
        eprintln!("❌ Error: {err}");
        std::process::exit(1);
    }
}
