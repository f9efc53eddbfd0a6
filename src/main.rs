fn main() {
    if let Err(err) = tabular_query::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
