//! Minting secret generator for lsat-gate.
//!
//! Writes a fresh 32-byte secret as hex. Every token root key is derived from
//! this secret, so replacing it invalidates all outstanding tokens.
//!
//! Usage:
//!   lsat-keygen [output-file]

use color_eyre::eyre::{bail, WrapErr};
use lsat_gate::MintingSecret;
use std::env;
use std::fs;
use std::path::PathBuf;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    println!("Minting secret generator for lsat-gate\n");

    // Get output file from args or use the current directory
    let path = env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("secret.hex"), PathBuf::from);

    if path.exists() {
        bail!(
            "{} already exists; remove it first if you mean to rotate the secret",
            path.display()
        );
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
    }

    let secret = MintingSecret::generate();
    secret
        .write_new(&path)
        .wrap_err_with(|| format!("failed to write {}", path.display()))?;

    println!("Secret saved to: {}", path.display());
    println!("  WARNING: Keep this file secure! Anyone holding it can mint tokens.");
    println!("\nPoint lsat-gate at it with --secret-path or LSAT_GATE_SECRET_PATH.");
    Ok(())
}
