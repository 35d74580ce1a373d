//! `TraceArgument` — a tagged union over the handful of primitive shapes an
//! instrumentation site can pass as an argument. The type tag is *not*
//! stored here; it lives in the tracepoint's static `arg_types`, which is
//! what keeps this type down to 8 bytes and `TraceEvent` to one cache line.

use std::ffi::CStr;
use std::fmt;

/// Discriminant for a `TraceArgument`'s payload, stored out-of-line in
/// `TracepointInfo::arg_types`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceArgumentType {
    None,
    Bool,
    Int,
    UInt,
    Double,
    Pointer,
    /// An external, presumed-`'static` nul-terminated string.
    String,
    /// A short string copied inline into the 8-byte cell, null-padded
    /// (and null-terminated unless it fills all 8 bytes).
    InlineString,
}

impl fmt::Display for TraceArgumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TraceArgumentType::None => "none",
            TraceArgumentType::Bool => "bool",
            TraceArgumentType::Int => "int",
            TraceArgumentType::UInt => "uint",
            TraceArgumentType::Double => "double",
            TraceArgumentType::Pointer => "pointer",
            TraceArgumentType::String => "string",
            TraceArgumentType::InlineString => "istring",
        };
        f.write_str(s)
    }
}

/// Raw 8-byte payload cell. Reading it requires knowing the type that was
/// used to write it, supplied separately by the caller (normally sourced
/// from `TracepointInfo::arg_types`).
#[repr(C)]
#[derive(Clone, Copy)]
pub union TraceArgument {
    as_bool: bool,
    as_int: i64,
    as_uint: u64,
    as_double: f64,
    as_pointer: *const (),
    as_string: *const i8,
    as_istring: [u8; 8],
}

const _: () = assert!(std::mem::size_of::<TraceArgument>() <= 8);

impl TraceArgument {
    pub const fn none() -> Self {
        TraceArgument { as_istring: [0; 8] }
    }

    pub const fn from_bool(v: bool) -> Self {
        TraceArgument { as_bool: v }
    }

    pub const fn from_int(v: i64) -> Self {
        TraceArgument { as_int: v }
    }

    pub const fn from_uint(v: u64) -> Self {
        TraceArgument { as_uint: v }
    }

    pub const fn from_double(v: f64) -> Self {
        TraceArgument { as_double: v }
    }

    pub fn from_pointer<T>(ptr: *const T) -> Self {
        TraceArgument {
            as_pointer: ptr as *const (),
        }
    }

    /// Stores the address of a `'static` C string. The caller must ensure
    /// `s` outlives every reader of this argument (in practice: a string
    /// literal or other `'static` data).
    pub fn from_static_cstr(s: &'static CStr) -> Self {
        TraceArgument {
            as_string: s.as_ptr(),
        }
    }

    /// Copies up to 8 bytes of `s` inline, null-padding (and
    /// null-terminating unless the string fills all 8 bytes).
    pub fn from_inline_str(s: &str) -> Self {
        let bytes = s.as_bytes();
        let len = bytes.len().min(8);
        let mut buf = [0u8; 8];
        buf[..len].copy_from_slice(&bytes[..len]);
        TraceArgument { as_istring: buf }
    }

    /// Renders this argument's value as its JSON representation, given the
    /// type it was constructed with.
    ///
    /// # Safety contract
    /// The caller must pass the same `TraceArgumentType` that was used to
    /// construct this value (normally read from the owning tracepoint's
    /// `arg_types`); passing a mismatched type is undefined behavior,
    /// matching the union's nature.
    pub fn to_json_value(&self, ty: TraceArgumentType) -> String {
        unsafe {
            match ty {
                TraceArgumentType::None => "\"none\"".to_string(),
                TraceArgumentType::Bool => {
                    if self.as_bool {
                        "true".to_string()
                    } else {
                        "false".to_string()
                    }
                }
                TraceArgumentType::Int => self.as_int.to_string(),
                TraceArgumentType::UInt => self.as_uint.to_string(),
                TraceArgumentType::Double => self.as_double.to_string(),
                TraceArgumentType::Pointer => {
                    format!("\"{:p}\"", self.as_pointer)
                }
                TraceArgumentType::String => {
                    let cstr = CStr::from_ptr(self.as_string);
                    crate::string_utils::to_json_string(&cstr.to_string_lossy())
                }
                TraceArgumentType::InlineString => {
                    let nul = self.as_istring.iter().position(|&b| b == 0);
                    let slice = match nul {
                        Some(pos) => &self.as_istring[..pos],
                        None => &self.as_istring[..],
                    };
                    crate::string_utils::to_json_string(&String::from_utf8_lossy(slice))
                }
            }
        }
    }
}

impl fmt::Debug for TraceArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceArgument({:?})", unsafe { self.as_istring })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn size_is_within_budget() {
        assert!(std::mem::size_of::<TraceArgument>() <= 8);
    }

    #[test]
    fn bool_round_trips_through_json() {
        assert_eq!(
            TraceArgument::from_bool(true).to_json_value(TraceArgumentType::Bool),
            "true"
        );
        assert_eq!(
            TraceArgument::from_bool(false).to_json_value(TraceArgumentType::Bool),
            "false"
        );
    }

    #[test]
    fn int_and_uint_render_as_plain_numbers() {
        assert_eq!(
            TraceArgument::from_int(-42).to_json_value(TraceArgumentType::Int),
            "-42"
        );
        assert_eq!(
            TraceArgument::from_uint(42).to_json_value(TraceArgumentType::UInt),
            "42"
        );
    }

    #[test]
    fn inline_string_stops_at_embedded_null() {
        let arg = TraceArgument::from_inline_str("hi");
        assert_eq!(
            arg.to_json_value(TraceArgumentType::InlineString),
            "\"hi\""
        );
    }

    #[test]
    fn inline_string_truncates_to_eight_bytes() {
        let arg = TraceArgument::from_inline_str("0123456789");
        assert_eq!(
            arg.to_json_value(TraceArgumentType::InlineString),
            "\"01234567\""
        );
    }

    #[test]
    fn static_cstr_round_trips() {
        let s: &'static CStr = c"hello";
        let arg = TraceArgument::from_static_cstr(s);
        assert_eq!(arg.to_json_value(TraceArgumentType::String), "\"hello\"");
        // also verify a heap-allocated (but leaked to 'static) CString works
        let leaked: &'static CStr = Box::leak(CString::new("world").unwrap().into_boxed_c_str());
        let arg2 = TraceArgument::from_static_cstr(leaked);
        assert_eq!(arg2.to_json_value(TraceArgumentType::String), "\"world\"");
    }
}
