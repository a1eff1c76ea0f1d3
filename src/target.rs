//! The target ABI description every size/alignment/signedness decision in
//! the type system and constant engine is parameterized over (`spec.md` §6).

/// Immutable description of the compilation target's ABI. Constructed once
/// by the driver and threaded through every [`crate::namespace::Namespace`]
/// and [`crate::types::Type`] constructor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetProfile {
    pub sizeof_int: u8,
    pub sizeof_long_int: u8,
    pub sizeof_long_long_int: u8,
    /// Must equal `sizeof(size_t)`.
    pub sizeof_pointer: u8,
    pub sizeof_long_double: u8,
    pub sizeof_bool: u8,
    pub sizeof_wchar: u8,

    pub alignof_int16: u8,
    pub alignof_int32: u8,
    pub alignof_int64: u8,
    pub alignof_float: u8,
    pub alignof_double: u8,
    pub alignof_long_double: u8,
    pub alignof_bool: u8,

    pub is_char_signed: bool,
    pub is_cross_compiling: bool,

    pub min_struct_sizeof: u8,
    pub min_struct_alignof: u8,
}

impl TargetProfile {
    /// A representative LP64 little-endian host profile (x86-64/AArch64
    /// Linux-like), used as the default in tests and by callers that are
    /// not cross-compiling.
    #[must_use]
    pub const fn host() -> Self {
        TargetProfile {
            sizeof_int: 4,
            sizeof_long_int: 8,
            sizeof_long_long_int: 8,
            sizeof_pointer: 8,
            sizeof_long_double: 16,
            sizeof_bool: 1,
            sizeof_wchar: 4,

            alignof_int16: 2,
            alignof_int32: 4,
            alignof_int64: 8,
            alignof_float: 4,
            alignof_double: 8,
            alignof_long_double: 16,
            alignof_bool: 1,

            is_char_signed: true,
            is_cross_compiling: false,

            min_struct_sizeof: 1,
            min_struct_alignof: 1,
        }
    }

    #[must_use]
    pub fn alignof_int(self, width: u8) -> u8 {
        match width {
            1 => 1,
            2 => self.alignof_int16,
            4 => self.alignof_int32,
            8 => self.alignof_int64,
            _ => unreachable!("integer width must be 1/2/4/8"),
        }
    }
}

impl Default for TargetProfile {
    fn default() -> Self {
        Self::host()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_profile_alignments_are_powers_of_two() {
        let t = TargetProfile::host();
        for a in [
            t.alignof_int16,
            t.alignof_int32,
            t.alignof_int64,
            t.alignof_float,
            t.alignof_double,
            t.alignof_long_double,
            t.alignof_bool,
        ] {
            assert!(a.is_power_of_two());
        }
    }
}
