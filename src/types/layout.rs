//! Offset/alignment computation for aggregate types and bit-field storage
//! arithmetic, ported from the member-walk in `dbcc_type_new_struct` /
//! `dbcc_type_new_union` (`dbcc-type.c`) and the read-side of
//! `dbcc_typed_value_get_bitfield` (`spec.md` §4.4 "Layout & Bitfield
//! Semantics").

use crate::diag::{Diag, DiagCode};
use crate::symbol::Symbol;
use crate::target::TargetProfile;

use super::Type;

#[inline]
fn align_up(offset: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (offset + align - 1) & !(align - 1)
}

/// One requested struct/union member, as handed to the constructor by the
/// grammar reducer: `bit_length = Some(0)` is a standard "force next
/// bit-field into a new storage unit" zero-width anonymous bit-field;
/// `name = None` is only legal when `bit_length.is_some()` (an anonymous
/// bit-field slot / padding).
#[derive(Clone, Debug)]
pub struct MemberSpec {
    pub name: Option<Symbol>,
    pub ty: Type,
    pub bit_length: Option<u8>,
}

/// A laid-out struct member.
#[derive(Clone, Debug)]
pub struct StructMember {
    pub name: Option<Symbol>,
    pub ty: Type,
    pub offset: u64,
    pub bitfield: Option<BitField>,
}

/// A laid-out union branch: always at offset 0, but bit-fields still record
/// their bit window within the shared storage.
#[derive(Clone, Debug)]
pub struct UnionBranch {
    pub name: Option<Symbol>,
    pub ty: Type,
    pub bitfield: Option<BitField>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitField {
    pub bit_offset: u8,
    pub bit_length: u8,
}

pub struct StructLayout {
    pub members: Vec<StructMember>,
    pub sizeof: u64,
    pub alignof: u64,
}

pub struct UnionLayout {
    pub branches: Vec<UnionBranch>,
    pub sizeof: u64,
    pub alignof: u64,
}

fn check_distinct_names(members: &[MemberSpec]) -> Result<(), Diag> {
    let mut names: Vec<Symbol> = members.iter().filter_map(|m| m.name).collect();
    names.sort_by_key(|s| s.into_usize());
    if names.windows(2).any(|w| w[0] == w[1]) {
        return Err(Diag::new(DiagCode::StructDuplicates, "duplicate member name"));
    }
    Ok(())
}

/// Lay out a sequence of struct members in declaration order. Bit-fields of
/// the same base-type width pack consecutively into one storage unit, the
/// way adjacent `unsigned x:3, y:5;` share one `unsigned` word; a
/// non-bitfield member, a bit-field whose base width differs from the
/// in-progress run, or a zero-length anonymous bit-field closes the run.
pub fn layout_struct(members: &[MemberSpec], target: &TargetProfile) -> Result<StructLayout, Diag> {
    check_distinct_names(members)?;
    if members.is_empty() {
        return Err(Diag::new(DiagCode::StructEmpty, "struct must have at least one member"));
    }

    let mut out = Vec::with_capacity(members.len());
    let mut cursor: u64 = 0;
    let mut max_align: u64 = 1;

    // Active bit-field run: (storage_offset, storage_sizeof, bits_used).
    let mut run: Option<(u64, u64, u32)> = None;

    for m in members {
        let member_align = u64::from(m.ty.alignof()).max(1);
        max_align = max_align.max(member_align);

        match m.bit_length {
            Some(bit_length) => {
                let storage_sizeof = u64::from(m.ty.sizeof());
                let storage_bits = storage_sizeof * 8;
                let fits_current_run = run
                    .is_some_and(|(_, run_sizeof, used)| run_sizeof == storage_sizeof && u64::from(used) + u64::from(bit_length) <= storage_bits);

                if bit_length == 0 || !fits_current_run {
                    cursor = align_up(cursor, member_align);
                    let storage_offset = cursor;
                    cursor += storage_sizeof;
                    run = if bit_length == 0 { None } else { Some((storage_offset, storage_sizeof, u32::from(bit_length))) };
                    if bit_length > 0 {
                        out.push(StructMember {
                            name: m.name,
                            ty: m.ty.clone(),
                            offset: storage_offset,
                            bitfield: Some(BitField { bit_offset: 0, bit_length }),
                        });
                    }
                } else {
                    let (storage_offset, _, used) = run.expect("fits_current_run implies Some");
                    out.push(StructMember {
                        name: m.name,
                        ty: m.ty.clone(),
                        offset: storage_offset,
                        bitfield: Some(BitField { bit_offset: used as u8, bit_length }),
                    });
                    run = Some((storage_offset, storage_sizeof, used + u32::from(bit_length)));
                }
            }
            None => {
                run = None;
                cursor = align_up(cursor, member_align);
                out.push(StructMember { name: m.name, ty: m.ty.clone(), offset: cursor, bitfield: None });
                cursor += u64::from(m.ty.sizeof());
            }
        }
    }

    let alignof = max_align.max(u64::from(target.min_struct_alignof));
    let sizeof = align_up(cursor, alignof).max(u64::from(target.min_struct_sizeof));
    Ok(StructLayout { members: out, sizeof, alignof })
}

/// Lay out union branches: every branch starts at offset 0; size/align are
/// the maximum across branches, floored at the target minimums.
pub fn layout_union(members: &[MemberSpec], target: &TargetProfile) -> Result<UnionLayout, Diag> {
    check_distinct_names(members)?;
    if members.is_empty() {
        return Err(Diag::new(DiagCode::StructEmpty, "union must have at least one member"));
    }

    let mut branches = Vec::with_capacity(members.len());
    let mut max_size: u64 = 0;
    let mut max_align: u64 = 1;
    for m in members {
        max_size = max_size.max(u64::from(m.ty.sizeof()));
        max_align = max_align.max(u64::from(m.ty.alignof()).max(1));
        let bitfield = m.bit_length.map(|bit_length| BitField { bit_offset: 0, bit_length });
        branches.push(UnionBranch { name: m.name, ty: m.ty.clone(), bitfield });
    }

    let alignof = max_align.max(u64::from(target.min_struct_alignof));
    let sizeof = align_up(max_size, alignof).max(u64::from(target.min_struct_sizeof));
    Ok(UnionLayout { branches, sizeof, alignof })
}

/// Extract a bit-field's value out of its storage unit's raw bit pattern,
/// sign-extending when `is_signed` and the field's top bit is set.
#[must_use]
pub fn read_bitfield(storage: u64, field: BitField, is_signed: bool) -> i64 {
    let mask = if field.bit_length >= 64 { u64::MAX } else { (1u64 << field.bit_length) - 1 };
    let raw = (storage >> field.bit_offset) & mask;
    if is_signed && field.bit_length > 0 && field.bit_length < 64 {
        let sign_bit = 1u64 << (field.bit_length - 1);
        if raw & sign_bit != 0 {
            return (raw | !mask) as i64;
        }
    }
    raw as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn plain_members_pack_with_alignment_padding() {
        let target = TargetProfile::host();
        let members = vec![
            MemberSpec { name: None, ty: Type::int_(1, true), bit_length: None },
            MemberSpec { name: None, ty: Type::int_(4, true), bit_length: None },
        ];
        let layout = layout_struct(&members, &target).unwrap();
        assert_eq!(layout.members[0].offset, 0);
        assert_eq!(layout.members[1].offset, 4); // padded up to alignof(int)=4
        assert_eq!(layout.alignof, 4);
        assert_eq!(layout.sizeof, 8);
    }

    #[test]
    fn adjacent_bitfields_share_one_storage_unit() {
        let target = TargetProfile::host();
        let members = vec![
            MemberSpec { name: None, ty: Type::int_(4, false), bit_length: Some(3) },
            MemberSpec { name: None, ty: Type::int_(4, false), bit_length: Some(5) },
        ];
        let layout = layout_struct(&members, &target).unwrap();
        assert_eq!(layout.members[0].offset, layout.members[1].offset);
        assert_eq!(layout.members[0].bitfield.unwrap().bit_offset, 0);
        assert_eq!(layout.members[1].bitfield.unwrap().bit_offset, 3);
        assert_eq!(layout.sizeof, 4);
    }

    #[test]
    fn zero_width_bitfield_forces_new_storage_unit() {
        let target = TargetProfile::host();
        let members = vec![
            MemberSpec { name: None, ty: Type::int_(4, false), bit_length: Some(3) },
            MemberSpec { name: None, ty: Type::int_(4, false), bit_length: Some(0) },
            MemberSpec { name: None, ty: Type::int_(4, false), bit_length: Some(5) },
        ];
        let layout = layout_struct(&members, &target).unwrap();
        assert_eq!(layout.members.len(), 2);
        assert_eq!(layout.members[1].offset, 4);
        assert_eq!(layout.sizeof, 8);
    }

    #[test]
    fn read_bitfield_sign_extends() {
        // 3-bit field holding 0b101 = 5, signed -> -3
        let field = BitField { bit_offset: 0, bit_length: 3 };
        assert_eq!(read_bitfield(0b101, field, true), -3);
        assert_eq!(read_bitfield(0b101, field, false), 5);
    }

    #[test]
    fn struct_layout_scenario_from_spec_section_8() {
        // struct { uint8_t a; uint32_t b; uint8_t c; } on a target with
        // alignof_int32 = 4, min_struct_align = 1, min_struct_size = 1
        // yields members at offsets 0, 4, 8, sizeof 12, alignof 4
        // (`spec.md` §8 scenario 4).
        let target = TargetProfile::host();
        let members = vec![
            MemberSpec { name: None, ty: Type::int_(1, false), bit_length: None },
            MemberSpec { name: None, ty: Type::int_with_align(4, false, &target), bit_length: None },
            MemberSpec { name: None, ty: Type::int_(1, false), bit_length: None },
        ];
        let layout = layout_struct(&members, &target).unwrap();
        assert_eq!(layout.members[0].offset, 0);
        assert_eq!(layout.members[1].offset, 4);
        assert_eq!(layout.members[2].offset, 8);
        assert_eq!(layout.sizeof, 12);
        assert_eq!(layout.alignof, 4);
    }

    #[test]
    fn union_layout_all_branches_share_offset_zero() {
        let target = TargetProfile::host();
        let members = vec![
            MemberSpec { name: None, ty: Type::int_(1, true), bit_length: None },
            MemberSpec { name: None, ty: Type::int_(8, true), bit_length: None },
        ];
        let layout = layout_union(&members, &target).unwrap();
        assert_eq!(layout.sizeof, 8);
        assert_eq!(layout.alignof, 8);
    }
}
