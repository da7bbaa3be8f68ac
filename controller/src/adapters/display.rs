use std::io::{self, Write};

use crate::ports::{DisplayError, DisplayPort};

/// Two-line display drawn onto a terminal or any other writer.
pub struct ConsoleDisplay<W: Write + Send> {
    out: W,
    rendered: bool,
}

impl ConsoleDisplay<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleDisplay<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            rendered: false,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> DisplayPort for ConsoleDisplay<W> {
    fn render(&mut self, line1: &str, line2: &str) -> Result<(), DisplayError> {
        writeln!(self.out, "┌ {line1}")?;
        writeln!(self.out, "└ {line2}")?;
        self.out.flush()?;
        self.rendered = true;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        if self.rendered {
            writeln!(self.out, "┌")?;
            writeln!(self.out, "└")?;
            self.out.flush()?;
            self.rendered = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_two_lines_and_blanks_on_release() {
        let mut display = ConsoleDisplay::new(Vec::new());
        display.render("Jan 15 08:30:00", "Temp: 72.5°F").unwrap();
        display.release();
        display.release();

        let written = String::from_utf8(display.into_inner()).unwrap();
        assert_eq!(written, "┌ Jan 15 08:30:00\n└ Temp: 72.5°F\n┌\n└\n");
    }
}
