//! Precedence walk across the registry's sources.

use super::Chipmunk;
use crate::ChipmunkError;
use log::{debug, warn};
use serde_json::Value;

/// Resolve a key without expansion or strict-miss handling.
///
/// Every active source is consulted, lowest precedence first, and the last
/// hit wins. Source errors propagate in strict mode and are skipped
/// otherwise.
pub(super) fn resolve_raw(
    chipmunk: &Chipmunk,
    key: &str,
) -> Result<Option<Value>, ChipmunkError> {
    let options = chipmunk.options();
    let mut candidate = None;
    for source in chipmunk.active_sources() {
        let native = source.native_key(key, options);
        let found = if options.case_sensitive {
            source.lookup(&native)
        } else {
            source.lookup_ignore_case(&native)
        };
        match found {
            Ok(Some(value)) => {
                debug!(
                    "key resolved (key={key}, alias={}, native={native})",
                    source.alias()
                );
                candidate = Some(value);
            }
            Ok(None) => {}
            Err(err) if options.strict_mode => return Err(err.into()),
            Err(err) => {
                warn!(
                    "skipping source during lookup (key={key}, alias={}): {err}",
                    source.alias()
                );
            }
        }
    }
    Ok(candidate)
}
