//! Status-line console output.
//!
//! Human-facing progress goes through [`Console`] as `TRACE` / `OK` / `ERR`
//! status lines; diagnostics go through `tracing`. Tests swap in the
//! in-memory variant and assert on the recorded lines.

use std::fmt;
use std::sync::{Arc, Mutex};

use console::style;

/// Severity of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Trace,
    Ok,
    Err,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Status::Trace => "TRACE",
            Status::Ok => "OK",
            Status::Err => "ERR",
        }
    }
}

#[derive(Debug, Clone)]
enum Sink {
    Stdout,
    Memory(Arc<Mutex<Vec<(Status, String)>>>),
}

/// Console sink for status lines.
#[derive(Debug, Clone)]
pub struct Console {
    sink: Sink,
}

impl Console {
    /// A console that writes styled status lines to stdout.
    pub fn stdout() -> Self {
        Self { sink: Sink::Stdout }
    }

    /// A console that records status lines instead of printing them.
    pub fn in_memory() -> Self {
        Self {
            sink: Sink::Memory(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    pub fn trace(&self, msg: impl fmt::Display) {
        self.say(Status::Trace, msg);
    }

    pub fn ok(&self, msg: impl fmt::Display) {
        self.say(Status::Ok, msg);
    }

    pub fn err(&self, msg: impl fmt::Display) {
        self.say(Status::Err, msg);
    }

    fn say(&self, status: Status, msg: impl fmt::Display) {
        match &self.sink {
            Sink::Stdout => {
                let label = match status {
                    Status::Trace => style(status.label()).green(),
                    Status::Ok => style(status.label()).blue(),
                    Status::Err => style(status.label()).red(),
                };
                println!("{label:>12}  {msg}");
            }
            Sink::Memory(lines) => {
                lines
                    .lock()
                    .expect("console lines poisoned")
                    .push((status, msg.to_string()));
            }
        }
    }

    /// Lines recorded by an in-memory console, in emission order.
    ///
    /// Returns an empty list for a stdout console.
    pub fn recorded(&self) -> Vec<(Status, String)> {
        match &self.sink {
            Sink::Stdout => Vec::new(),
            Sink::Memory(lines) => lines.lock().expect("console lines poisoned").clone(),
        }
    }
}
