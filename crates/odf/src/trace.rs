pub use odf_spy::records;
pub use odf_spy::{PayloadBuilder, TraceError, TraceHook};

use log::warn;

/// Hands one record to `hook`, if any. Failures are logged and dropped so
/// tracing never disturbs an execution.
pub(crate) fn emit(hook: Option<&TraceHook>, record_type: u8, payload: PayloadBuilder) {
    if let Some(hook) = hook {
        let bytes = payload.into_vec();
        if let Err(err) = hook(record_type, &bytes, true) {
            warn!("trace record {record_type} dropped: {err}");
        }
    }
}
