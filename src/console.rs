/// Console output helpers.
use std::io::{self, Write};

use crossterm::{style, ExecutableCommand};

const NAME: &str = env!("CARGO_PKG_NAME");

pub fn print_prompt() -> io::Result<()> {
    io::stdout()
        .execute(style::SetAttribute(style::Attribute::Bold))?
        .execute(style::Print(format!("{}> ", NAME)))?
        .execute(style::SetAttribute(style::Attribute::Reset))?;
    io::stdout().flush()?;
    Ok(())
}

pub fn echo(s: String) {
    let _ = io::stdout().execute(style::Print(format!("{}\n", s)));
    let _ = io::stdout().flush();
}

pub fn echo_lines(s: String) {
    for l in s.lines() {
        let _ = io::stdout().execute(style::Print(format!("{}\n", l)));
    }
    let _ = io::stdout().flush();
}

pub fn error(s: String) {
    let _ = io::stderr().execute(style::Print(format!("{}\n", s)));
    let _ = io::stderr().flush();
}

#[macro_export]
macro_rules! echo {
    ($($arg:tt)*) => {
        $crate::console::echo(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! echo_lines {
    ($($arg:tt)*) => {
        $crate::console::echo_lines(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::console::error(format!($($arg)*))
    };
}
