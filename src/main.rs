//! The `kpass` binary

use env_logger::{Builder, Env};

use kpass::consts::KPASS_LOG;

fn main() {
    Builder::from_env(Env::new().filter_or(KPASS_LOG, "warn"))
        .format_timestamp(None)
        .init();

    if let Err(err) = kpass::cli::run() {
        eprint!("{}", err);
        err.chain().skip(1).for_each(|e| eprint!(": {}", e));
        eprintln!();

        std::process::exit(1);
    }
}
