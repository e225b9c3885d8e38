//! Build script for the collection scanner
//!
//! The schema is embedded with `sqlx::migrate!`, so a changed migration
//! must trigger a rebuild.

fn main() {
    println!("cargo:rerun-if-changed=migrations");
}
