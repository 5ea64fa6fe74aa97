fn main() {
    if let Err(err) = csvpb::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
