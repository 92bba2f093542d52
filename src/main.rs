fn main() {
    if let Err(err) = maestro_merge::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
