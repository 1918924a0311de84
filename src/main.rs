fn main() {
    std::process::exit(hbcxx::cli::run());
}
