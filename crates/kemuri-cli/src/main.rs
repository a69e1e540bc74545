//! Binaire `kemuri` : tout est dans la lib.

fn main() {
    if let Err(e) = kemuri_cli::run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
