// src/main.rs

fn main() {
    if let Err(e) = thermotap_lib::run() {
        eprintln!("thermotap: {}", e);
        std::process::exit(1);
    }
}
