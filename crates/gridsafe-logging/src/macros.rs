//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Context-enriched logging macros for playback components."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---

/// Shared expansion for the `gs_*` macros. Not part of the public API.
#[doc(hidden)]
#[macro_export]
macro_rules! __gs_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx: &$crate::LogContext<'_> = $ctx;
        tracing::event!(
            $level,
            zone = ctx.zone.unwrap_or(""),
            model = ctx.model.unwrap_or(""),
            dataset = ctx.dataset.unwrap_or(""),
            cursor = ctx.cursor.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with playback context.
#[macro_export]
macro_rules! gs_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__gs_event!(tracing::Level::INFO, &$ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__gs_event!(tracing::Level::INFO, &$crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with playback context.
#[macro_export]
macro_rules! gs_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__gs_event!(tracing::Level::DEBUG, &$ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__gs_event!(tracing::Level::DEBUG, &$crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with playback context.
#[macro_export]
macro_rules! gs_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__gs_event!(tracing::Level::WARN, &$ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__gs_event!(tracing::Level::WARN, &$crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with playback context.
#[macro_export]
macro_rules! gs_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__gs_event!(tracing::Level::ERROR, &$ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__gs_event!(tracing::Level::ERROR, &$crate::LogContext::default(), $($arg)+)
    };
}
