use std::{
    cell::RefCell,
    fmt,
    io::{self, Write as _},
    rc::Rc,
};

/// Trait for handling output from `print` and [`Context::print`](crate::Context::print).
///
/// Implement this trait to capture or redirect script output. Text crosses the
/// boundary as raw bytes; invalid UTF-8 is passed through untouched.
pub trait PrintWriter {
    /// Called with each chunk of output, separators and terminators included.
    fn write_bytes(&mut self, output: &[u8]);
}

/// `PrintWriter` that writes to the process stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write_bytes(&mut self, output: &[u8]) {
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(output);
        let _ = stdout.flush();
    }
}

/// A `PrintWriter` that collects all output into a shared buffer.
///
/// Clones share the buffer, so a test can keep one clone and hand the other to
/// the context.
#[derive(Debug, Default, Clone)]
pub struct CollectStringPrint(Rc<RefCell<Vec<u8>>>);

impl CollectStringPrint {
    /// Creates a new empty `CollectStringPrint`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collected output, decoded lossily.
    #[must_use]
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    /// Returns the collected output as raw bytes.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }

    /// Discards everything collected so far.
    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl PrintWriter for CollectStringPrint {
    fn write_bytes(&mut self, output: &[u8]) {
        self.0.borrow_mut().extend_from_slice(output);
    }
}

/// `PrintWriter` that ignores all output.
///
/// This is the default sink of a context.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write_bytes(&mut self, _output: &[u8]) {}
}

/// Adapts a closure into a `PrintWriter`.
pub struct CallbackPrint<F>(pub F);

impl<F: FnMut(&[u8])> PrintWriter for CallbackPrint<F> {
    fn write_bytes(&mut self, output: &[u8]) {
        (self.0)(output);
    }
}

impl<F> fmt::Debug for CallbackPrint<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallbackPrint")
    }
}
