//! List command implementation

use crate::backends::backends;

/// List all backends
pub fn list_backends() {
    println!("Supported backends:");
    println!();
    for b in backends() {
        let status = if b.available {
            ""
        } else {
            " (rebuild with --features libftdi)"
        };
        println!("  {:<8} - {}{}", b.name, b.description, status);
        if !b.aliases.is_empty() {
            println!("             aliases: {}", b.aliases.join(", "));
        }
    }
}
