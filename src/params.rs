/// A single captured path parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub value: String,
}

/// Path parameters in pattern declaration order.
///
/// Kept as a list rather than a map so repeated names stay positionally
/// distinguishable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    list: Vec<Param>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value of the first parameter named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.list
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.list.iter()
    }

    /// `(key, value)` pairs, handy for assertions.
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.list
            .iter()
            .map(|p| (p.key.as_str(), p.value.as_str()))
            .collect()
    }

    pub(crate) fn push(&mut self, key: &str, value: String) {
        self.list.push(Param {
            key: key.to_owned(),
            value,
        });
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.list.truncate(len);
    }

    pub(crate) fn clear(&mut self) {
        self.list.clear();
    }
}

impl std::ops::Index<usize> for Params {
    type Output = Param;

    fn index(&self, index: usize) -> &Param {
        &self.list[index]
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a Param;
    type IntoIter = std::slice::Iter<'a, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.list.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests that lookups by name return the first match while order is preserved.
    #[test]
    fn test_params_order_and_lookup() {
        let mut params = Params::new();
        params.push("id", "1".into());
        params.push("name", "gordon".into());
        params.push("id", "2".into());

        assert_eq!(params.get("id"), Some("1"));
        assert_eq!(params[2].value, "2");
        assert_eq!(params.pairs(), vec![("id", "1"), ("name", "gordon"), ("id", "2")]);

        params.truncate(1);
        assert_eq!(params.len(), 1);
        params.clear();
        assert!(params.is_empty());
    }
}
