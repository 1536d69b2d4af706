use edgekit_core::transport::WireHeader;

/// An ordered multi-value collection of HTTP headers.
///
/// Names are case-insensitive: every operation lowercases the name before
/// touching the map, so `set("Content-Type", ..)` and `get("content-type")`
/// address the same entry. Keys iterate in order of first insertion and
/// values under one key keep their insertion order (e.g. multiple
/// `Set-Cookie` headers).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, Vec<String>)>,
}

fn canonical(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl HeaderMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        let idx = self.position(name)?;
        self.entries[idx].1.first().map(String::as_str)
    }

    /// All values for `name`, in insertion order. Empty when absent.
    pub fn values(&self, name: &str) -> &[String] {
        match self.position(name) {
            Some(idx) => &self.entries[idx].1,
            None => &[],
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Replace every value of `name` with `value`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.position(name) {
            Some(idx) => self.entries[idx].1 = vec![value],
            None => self.entries.push((canonical(name), vec![value])),
        }
    }

    /// Append `value` to `name`, keeping existing values.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.position(name) {
            Some(idx) => self.entries[idx].1.push(value),
            None => self.entries.push((canonical(name), vec![value])),
        }
    }

    pub fn delete(&mut self, name: &str) {
        self.entries.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }

    /// Distinct canonical names.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    /// Replace the entire contents with a copy of `other`.
    pub fn reset(&mut self, other: &HeaderMap) {
        self.entries.clone_from(&other.entries);
    }

    /// Overwrite each key present in `other`, leaving the rest untouched.
    pub fn apply(&mut self, other: &HeaderMap) {
        for (key, values) in &other.entries {
            match self.position(key) {
                Some(idx) => self.entries[idx].1.clone_from(values),
                None => self.entries.push((key.clone(), values.clone())),
            }
        }
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn to_wire(&self) -> Vec<WireHeader> {
        self.iter()
            .flat_map(|(name, values)| values.iter().map(move |v| WireHeader::new(name, v.clone())))
            .collect()
    }

    pub(crate) fn from_wire(headers: Vec<WireHeader>) -> Self {
        let mut map = Self::new();
        for header in headers {
            map.add(&header.name, header.value);
        }
        map
    }
}

impl<N: AsRef<str>, V: Into<String>> FromIterator<(N, V)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, value) in iter {
            map.add(name.as_ref(), value);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_ignores_case() {
        for (set_name, get_name) in [
            ("Content-Type", "content-type"),
            ("content-type", "CONTENT-TYPE"),
            ("CoNtEnT-TyPe", "Content-type"),
        ] {
            let mut headers = HeaderMap::new();
            headers.set(set_name, "text/plain");
            assert_eq!(headers.get(get_name), Some("text/plain"));
        }
    }

    #[test]
    fn add_keeps_values_in_order() {
        let mut headers = HeaderMap::new();
        headers.add("Set-Cookie", "a=1");
        headers.add("set-cookie", "b=2");
        headers.add("SET-COOKIE", "c=3");

        assert_eq!(headers.values("Set-Cookie"), ["a=1", "b=2", "c=3"]);
        assert_eq!(headers.get("set-cookie"), Some("a=1"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn set_replaces_all_values() {
        let mut headers = HeaderMap::new();
        headers.add("Accept", "text/html");
        headers.add("Accept", "application/json");
        headers.set("ACCEPT", "*/*");
        assert_eq!(headers.values("accept"), ["*/*"]);
    }

    #[test]
    fn delete_removes_every_value() {
        let mut headers = HeaderMap::new();
        headers.add("X-A", "1");
        headers.add("x-a", "2");
        headers.add("X-B", "3");
        headers.delete("X-a");

        assert!(headers.values("x-a").is_empty());
        assert_eq!(headers.get("x-a"), None);
        assert_eq!(headers.keys().collect::<Vec<_>>(), ["x-b"]);
    }

    #[test]
    fn keys_are_canonical_in_first_insertion_order() {
        let mut headers = HeaderMap::new();
        headers.add("Host", "example.com");
        headers.add("X-Trace", "1");
        headers.add("HOST", "other");
        assert_eq!(headers.keys().collect::<Vec<_>>(), ["host", "x-trace"]);
    }

    #[test]
    fn clone_is_independent() {
        let mut original = HeaderMap::new();
        original.set("X-Value", "one");
        let copy = original.clone();
        original.set("X-Value", "two");
        assert_eq!(copy.get("x-value"), Some("one"));
    }

    #[test]
    fn reset_replaces_contents() {
        let mut headers: HeaderMap = [("A", "1"), ("B", "2")].into_iter().collect();
        let other: HeaderMap = [("C", "3")].into_iter().collect();
        headers.reset(&other);
        assert_eq!(headers, other);
    }

    #[test]
    fn apply_overwrites_only_present_keys() {
        let mut headers: HeaderMap = [("A", "1"), ("A", "2"), ("B", "keep")].into_iter().collect();
        let other: HeaderMap = [("a", "new"), ("C", "3")].into_iter().collect();
        headers.apply(&other);

        assert_eq!(headers.values("A"), ["new"]);
        assert_eq!(headers.get("B"), Some("keep"));
        assert_eq!(headers.get("c"), Some("3"));
    }

    #[test]
    fn wire_conversion_flattens_multi_values() {
        let headers: HeaderMap = [("Vary", "a"), ("Vary", "b")].into_iter().collect();
        let wire = headers.to_wire();
        assert_eq!(wire.len(), 2);
        assert_eq!(HeaderMap::from_wire(wire), headers);
    }
}
