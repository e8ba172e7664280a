//! Static geography served while the carrier API is unreachable.
//!
//! Advisory only: a handful of major cities so checkout forms stay usable.

use rust_decimal::Decimal;

use super::types::{District, FeeQuote, Province, Ward};

/// Flat fee quoted while the carrier is down, in VND.
pub const FLAT_FEE_VND: i64 = 30_000;

const PROVINCES: &[(i32, &str)] = &[
    (201, "Hà Nội"),
    (202, "Hồ Chí Minh"),
    (203, "Đà Nẵng"),
];

const DISTRICTS: &[(i32, i32, &str)] = &[
    (1484, 201, "Quận Ba Đình"),
    (1489, 201, "Quận Hoàn Kiếm"),
    (1442, 202, "Quận 1"),
    (1444, 202, "Quận 3"),
    (1526, 203, "Quận Hải Châu"),
];

const WARDS: &[(&str, i32, &str)] = &[
    ("1A0101", 1484, "Phường Phúc Xá"),
    ("1A0102", 1484, "Phường Trúc Bạch"),
    ("1A0201", 1489, "Phường Hàng Bạc"),
    ("20101", 1442, "Phường Bến Nghé"),
    ("20109", 1442, "Phường Bến Thành"),
    ("20301", 1444, "Phường Võ Thị Sáu"),
    ("40101", 1526, "Phường Hải Châu I"),
];

#[must_use]
pub fn provinces() -> Vec<Province> {
    PROVINCES
        .iter()
        .map(|&(province_id, name)| Province {
            province_id,
            province_name: name.to_string(),
        })
        .collect()
}

#[must_use]
pub fn districts(province_id: i32) -> Vec<District> {
    DISTRICTS
        .iter()
        .filter(|(_, province, _)| *province == province_id)
        .map(|&(district_id, province_id, name)| District {
            district_id,
            province_id,
            district_name: name.to_string(),
        })
        .collect()
}

#[must_use]
pub fn wards(district_id: i32) -> Vec<Ward> {
    WARDS
        .iter()
        .filter(|(_, district, _)| *district == district_id)
        .map(|&(code, district_id, name)| Ward {
            ward_code: code.to_string(),
            district_id,
            ward_name: name.to_string(),
        })
        .collect()
}

#[must_use]
pub fn fee_quote() -> FeeQuote {
    FeeQuote {
        total: Decimal::from(FLAT_FEE_VND),
        service_fee: Decimal::from(FLAT_FEE_VND),
        insurance_fee: Decimal::ZERO,
        estimated: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_hierarchy_is_consistent() {
        for province in provinces() {
            let districts = districts(province.province_id);
            assert!(!districts.is_empty(), "{} has no districts", province.province_name);
            for district in districts {
                assert!(!wards(district.district_id).is_empty());
            }
        }
        assert!(districts(999).is_empty());
    }
}
