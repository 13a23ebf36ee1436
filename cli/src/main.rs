use std::process::exit;

fn main() {
    let args = std::env::args().peekable();
    match gamesman::run(args) {
        Ok(code) => exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            exit(gamesman_core::Error::HeadlessError(e.to_string()).code());
        }
    }
}
