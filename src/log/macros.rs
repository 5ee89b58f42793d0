//! Call-site capturing macros: each of `log_info!`/`log_warn!`/`log_crit!`
//! builds a [`crate::log::record::Record`] from `file!()`/`line!()` and the
//! enclosing function's path, then streams fields into it before handing it
//! to the queue. `__vortex_function_name!` is the standard
//! `std::any::type_name`-of-a-local-fn trick for recovering that path at the
//! call site, since Rust has no `__func__`.

/// Resolves to the enclosing function's path as a `&'static str`. Not
/// part of the public API; used internally by the `log_*!` macros.
#[doc(hidden)]
#[macro_export]
macro_rules! __vortex_function_name {
    () => {{
        fn marker() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(marker);
        &name[..name.len() - "::marker".len()]
    }};
}

/// Logs an informational record. `log_info!("connected", peer_fd)`. Wrap a
/// `&'static str` field in [`crate::log::record::StaticStr`] to have it
/// encoded by pointer instead of copied.
#[macro_export]
macro_rules! log_info {
    ($($field:expr),* $(,)?) => {{
        if $crate::log::logger::is_initialized() {
            let mut record = $crate::log::record::Record::new(
                $crate::log::level::Severity::Info,
                file!(),
                $crate::__vortex_function_name!(),
                line!(),
            );
            $( $crate::log::record::IntoField::append_to(&$field, &mut record); )*
            $crate::log::logger::push(record);
        }
    }};
}

/// Logs a warning record.
#[macro_export]
macro_rules! log_warn {
    ($($field:expr),* $(,)?) => {{
        if $crate::log::logger::is_initialized() {
            let mut record = $crate::log::record::Record::new(
                $crate::log::level::Severity::Warn,
                file!(),
                $crate::__vortex_function_name!(),
                line!(),
            );
            $( $crate::log::record::IntoField::append_to(&$field, &mut record); )*
            $crate::log::logger::push(record);
        }
    }};
}

/// Logs a critical record; the writer flushes the file immediately after
/// writing it.
#[macro_export]
macro_rules! log_crit {
    ($($field:expr),* $(,)?) => {{
        if $crate::log::logger::is_initialized() {
            let mut record = $crate::log::record::Record::new(
                $crate::log::level::Severity::Crit,
                file!(),
                $crate::__vortex_function_name!(),
                line!(),
            );
            $( $crate::log::record::IntoField::append_to(&$field, &mut record); )*
            $crate::log::logger::push(record);
        }
    }};
}
