use super::HeadersFilter;
use crate::model::MultiValueMap;

/// Sets a header, replacing any value it had under any casing.
#[derive(Debug)]
pub struct AddHeaderFilter {
    header_name: String,
    header_value: String,
}

impl AddHeaderFilter {
    pub fn new<S1: Into<String>, S2: Into<String>>(name: S1, value: S2) -> Self {
        Self {
            header_name: name.into(),
            header_value: value.into(),
        }
    }
}

impl HeadersFilter for AddHeaderFilter {
    fn apply(&self, headers: &mut MultiValueMap) {
        headers.retain(|name, _| !name.eq_ignore_ascii_case(&self.header_name));
        headers.insert(self.header_name.clone(), vec![self.header_value.clone()]);
    }
}
