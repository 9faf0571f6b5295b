// 📍 Address Resolver - free-text address → district label
//
// Resolution is positional: an eligible address names the region somewhere and
// carries the district as its second whitespace-separated token
// ("서울특별시 강남구 테헤란로 1" → "강남구"). There is no fuzzy matching;
// irregular addresses fall out as Unmatched.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnmatchedReason {
    /// Address cell empty
    EmptyAddress,

    /// Address does not name the configured region
    OutOfRegion,

    /// Region present but no second token to read a district from
    MissingDistrictSegment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    District(String),
    Unmatched(UnmatchedReason),
}

impl Resolution {
    pub fn district(&self) -> Option<&str> {
        match self {
            Resolution::District(name) => Some(name),
            Resolution::Unmatched(_) => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Resolution::District(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressResolver {
    region: String,
}

impl AddressResolver {
    pub fn new(region: impl Into<String>) -> Self {
        AddressResolver {
            region: region.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn resolve(&self, address: &str) -> Resolution {
        let address = address.trim();
        if address.is_empty() {
            return Resolution::Unmatched(UnmatchedReason::EmptyAddress);
        }

        if !address.contains(self.region.as_str()) {
            return Resolution::Unmatched(UnmatchedReason::OutOfRegion);
        }

        match address.split_whitespace().nth(1) {
            Some(district) => Resolution::District(district.to_string()),
            None => Resolution::Unmatched(UnmatchedReason::MissingDistrictSegment),
        }
    }

    /// Resolve an optional address cell
    pub fn resolve_opt(&self, address: Option<&str>) -> Resolution {
        match address {
            Some(a) => self.resolve(a),
            None => Resolution::Unmatched(UnmatchedReason::EmptyAddress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seoul() -> AddressResolver {
        AddressResolver::new("서울특별시")
    }

    #[test]
    fn test_second_segment_is_district() {
        assert_eq!(
            seoul().resolve("서울특별시 강남구 테헤란로 152"),
            Resolution::District("강남구".to_string())
        );
    }

    #[test]
    fn test_other_region_is_unmatched() {
        assert_eq!(
            seoul().resolve("부산 해운대구 센텀중앙로 79"),
            Resolution::Unmatched(UnmatchedReason::OutOfRegion)
        );
    }

    #[test]
    fn test_region_only_is_unmatched() {
        assert_eq!(
            seoul().resolve("서울특별시"),
            Resolution::Unmatched(UnmatchedReason::MissingDistrictSegment)
        );
    }

    #[test]
    fn test_empty_address_is_unmatched() {
        assert_eq!(
            seoul().resolve("   "),
            Resolution::Unmatched(UnmatchedReason::EmptyAddress)
        );
        assert_eq!(
            seoul().resolve_opt(None),
            Resolution::Unmatched(UnmatchedReason::EmptyAddress)
        );
    }

    #[test]
    fn test_extra_whitespace_between_segments() {
        let resolution = seoul().resolve("  서울특별시\t  마포구   월드컵북로 ");
        assert_eq!(resolution.district(), Some("마포구"));
        assert!(resolution.is_matched());
    }

    #[test]
    fn test_irregular_prefix_is_read_positionally() {
        // No name matching: the second token is taken as-is
        let resolution = seoul().resolve("(주)본사 서울특별시 종로구");
        assert_eq!(resolution.district(), Some("서울특별시"));
    }
}
