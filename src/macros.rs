//! Log-event macros that compile down to `tracing` events when the feature is enabled.
//!
//! Only plain format strings are accepted so the disabled branch can still type-check the
//! arguments through `format_args!` without evaluating them into a `String`.

macro_rules! obs_event {
	($level:ident, $($arg:tt)+) => {{
		#[cfg(feature = "tracing")]
		{
			::tracing::$level!($($arg)+);
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = format_args!($($arg)+);
		}
	}};
}

macro_rules! obs_debug {
	($($arg:tt)+) => {
		obs_event!(debug, $($arg)+)
	};
}

macro_rules! obs_info {
	($($arg:tt)+) => {
		obs_event!(info, $($arg)+)
	};
}

macro_rules! obs_warn {
	($($arg:tt)+) => {
		obs_event!(warn, $($arg)+)
	};
}
