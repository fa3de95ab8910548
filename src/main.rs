fn main() {
    if let Err(err) = vintage_parse::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
