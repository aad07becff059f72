//! Helper macros for PDU encoding and decoding.
//!
//! These are thin wrappers around the generic error constructors exported by
//! [`rdp_nego_core`]; the concrete error type (`DecodeError` or `EncodeError`)
//! is inferred from the enclosing function's return type.

/// Builds a "not enough bytes" error for the current context.
#[macro_export]
macro_rules! not_enough_bytes_err {
    ($context:expr, $received:expr, $expected:expr $(,)?) => {{
        rdp_nego_core::not_enough_bytes_err($context, $received, $expected)
    }};
    ($received:expr, $expected:expr $(,)?) => {{
        $crate::not_enough_bytes_err!(Self::NAME, $received, $expected)
    }};
}

/// Builds an "invalid field" error for the current context.
#[macro_export]
macro_rules! invalid_field_err {
    ($context:expr, $field:expr, $reason:expr $(,)?) => {{
        rdp_nego_core::invalid_field_err($context, $field, $reason)
    }};
    ($field:expr, $reason:expr $(,)?) => {{
        $crate::invalid_field_err!(Self::NAME, $field, $reason)
    }};
}

/// Builds an "unexpected message type" error for the current context.
#[macro_export]
macro_rules! unexpected_message_type_err {
    ($context:expr, $got:expr $(,)?) => {{
        rdp_nego_core::unexpected_message_type_err($context, $got)
    }};
    ($got:expr $(,)?) => {{
        $crate::unexpected_message_type_err!(Self::NAME, $got)
    }};
}

/// Builds an "unsupported version" error for the current context.
#[macro_export]
macro_rules! unsupported_version_err {
    ($context:expr, $got:expr $(,)?) => {{
        rdp_nego_core::unsupported_version_err($context, $got)
    }};
    ($got:expr $(,)?) => {{
        $crate::unsupported_version_err!(Self::NAME, $got)
    }};
}

/// Bails out with a "not enough bytes" error unless the cursor holds at least `size` bytes.
#[macro_export]
macro_rules! ensure_size {
    (ctx: $ctx:expr, in: $buf:ident, size: $expected:expr) => {{
        let received = $buf.len();
        let expected = $expected;
        if received < expected {
            return Err($crate::not_enough_bytes_err!($ctx, received, expected));
        }
    }};
    (in: $buf:ident, size: $expected:expr) => {{
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: $expected)
    }};
}

/// Shorthand for [`ensure_size!`] using `Self::FIXED_PART_SIZE`.
#[macro_export]
macro_rules! ensure_fixed_part_size {
    (in: $buf:ident) => {{
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: Self::FIXED_PART_SIZE)
    }};
}

/// Casts a length to the target integer type, reporting an "invalid field" error on overflow.
#[macro_export]
macro_rules! cast_length {
    ($ctx:expr, $field:expr, $len:expr) => {{
        ::core::convert::TryInto::try_into($len).map_err(|_| $crate::invalid_field_err!($ctx, $field, "too many elements"))
    }};
    ($field:expr, $len:expr) => {{
        $crate::cast_length!(Self::NAME, $field, $len)
    }};
}
