use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Formats a list of names for terminal output.
pub(crate) fn format_names(names: &[String]) -> String {
    if names.is_empty() {
        return "<none>".to_string();
    }
    names.join(", ")
}

/// Formats a completion percentage with one decimal place.
pub(crate) fn format_percent(percent: f64) -> String {
    format!("{percent:.1}%")
}
