//! Observation of native-function results.
//!
//! When a [`Notifier`] is installed, the VM reports every value returned
//! by a native function together with the access path at which the value
//! (or the value it was merged into) appears in the manifested document.
//! Notifications fire leaves first: deeper paths before their ancestors.
//! Each native call produces exactly one notification; results that never
//! reach the final document are flushed after manifestation with an empty
//! access path.

/// One step of an access path into the manifested document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathStep {
    Field(String),
    Index(usize),
}

/// Observer of native-function results. See the module documentation.
pub trait Notifier {
    /// `partial` is true when the native result was merged or extended on
    /// its way into the document; `partial_value` is then the result as
    /// the native function produced it and `final_value` the value after
    /// all merging at that position.
    fn on_generated_value(
        &mut self,
        fn_name: &str,
        args: &[serde_json::Value],
        partial: bool,
        partial_value: &serde_json::Value,
        final_value: &serde_json::Value,
        steps: &[PathStep],
    );
}
