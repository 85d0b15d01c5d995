//! Operator-facing output. Diagnostics go through `log`; this is what a
//! person running the command reads.

pub fn line(message: impl AsRef<str>) {
    println!("{}", message.as_ref());
}

pub fn blank() {
    println!();
}

/// Echo captured command output, skipping empty output.
pub fn echo(output: &str) {
    if !output.trim().is_empty() {
        println!("{}", output.trim_end());
    }
}

pub fn success(message: impl AsRef<str>) {
    println!("✔ {}", message.as_ref());
}

pub fn warn(message: impl AsRef<str>) {
    eprintln!("⚠ {}", message.as_ref());
}

pub fn failure(message: impl AsRef<str>) {
    eprintln!("✘ {}", message.as_ref());
}
