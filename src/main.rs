fn main() {
  std::process::exit(hdnode::cli::run());
}
