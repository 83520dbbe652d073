fn main() {
    if let Err(e) = oatscope_cli::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
