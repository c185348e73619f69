//! What a script needs from its host.

use crate::marshal::ValueRecognizer;
use gv_core::value::Value;
use std::rc::Rc;

/// Supplies the handle, globals and value recognizers for script runs.
///
/// Database drivers implement this so every `up`/`down` call sees the
/// backend's capability object and helper globals.
pub trait ScriptHost {
    /// Capability object passed to `up`/`down`.
    fn handle(&self) -> Value;

    /// Values installed in the global namespace before the bundle runs.
    fn globals(&self) -> Vec<(String, Value)> {
        Vec::new()
    }

    /// Script source evaluated after the globals and before the bundle.
    fn prelude(&self) -> Option<&str> {
        None
    }

    /// Recognizers for backend-specific values, consulted in order.
    fn recognizers(&self) -> Vec<Rc<dyn ValueRecognizer>> {
        Vec::new()
    }
}
