fn main() {
    if let Err(err) = registration_trends::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
