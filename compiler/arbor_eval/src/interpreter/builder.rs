//! `InterpreterBuilder` for creating Interpreter instances with a custom
//! reflector.

use std::sync::Arc;

use super::reflector::{NativeReflector, Reflector};
use super::Interpreter;
use crate::evaluator::AdapterCache;

/// Builder for [`Interpreter`].
///
/// The default reflector is [`NativeReflector`].
#[derive(Default)]
pub struct InterpreterBuilder {
    reflector: Option<Arc<dyn Reflector>>,
}

impl InterpreterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route member access through `reflector`.
    #[must_use]
    pub fn reflector(mut self, reflector: Arc<dyn Reflector>) -> Self {
        self.reflector = Some(reflector);
        self
    }

    pub fn build(self) -> Interpreter {
        Interpreter {
            reflector: self
                .reflector
                .unwrap_or_else(|| Arc::new(NativeReflector)),
            adapters: AdapterCache::new(),
        }
    }
}
