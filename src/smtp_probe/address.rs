use std::collections::BTreeMap;

use super::error::SessionError;

/// A parsed `local@domain` address (§3).
///
/// Equality/ordering is case-sensitive on the local-part and
/// case-insensitive on the domain, matching the spec's data model.
#[derive(Debug, Clone)]
pub struct Address {
    pub local: String,
    pub domain: String,
}

impl Address {
    /// Split on the *last* `@`; everything before is the local-part.
    /// Fails with `MalformedAddress` if there is no `@` or the domain is
    /// empty.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let pos = raw
            .rfind('@')
            .ok_or_else(|| SessionError::malformed_address(raw))?;
        let (local, domain_with_at) = raw.split_at(pos);
        let domain = &domain_with_at[1..];
        if domain.is_empty() {
            return Err(SessionError::malformed_address(raw));
        }
        Ok(Self {
            local: local.to_string(),
            domain: domain.to_string(),
        })
    }

    pub fn domain_key(&self) -> String {
        self.domain.to_ascii_lowercase()
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.local == other.local && self.domain.eq_ignore_ascii_case(&other.domain)
    }
}
impl Eq for Address {}

/// One domain's worth of local-parts to verify, insertion order preserved,
/// duplicates dropped (§3 `DomainBatch`).
#[derive(Debug, Clone, Default)]
pub struct DomainUsers {
    order: Vec<String>,
    seen: std::collections::HashSet<String>,
}

impl DomainUsers {
    pub fn push(&mut self, local: String) {
        if self.seen.insert(local.clone()) {
            self.order.push(local);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

/// `domain -> DomainUsers`, grouping inputs for the dispatcher (§3).
///
/// A `BTreeMap` keyed on the lowercase domain gives deterministic iteration
/// order for tests; the dispatcher still walks each domain's users in
/// insertion order per invariant 6 (§8).
#[derive(Debug, Clone, Default)]
pub struct DomainBatch {
    domains: BTreeMap<String, DomainUsers>,
    /// `domain_key -> local-part -> first-seen original string`, since the
    /// result map must key on the *original* `user@domain` string (§4.9),
    /// exact casing preserved, not the normalized form.
    originals: BTreeMap<String, BTreeMap<String, String>>,
}

impl DomainBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `raw` and groups it by domain. Malformed addresses are
    /// reported back to the caller rather than silently dropped, but do
    /// not abort the batch (§7: "Reject the specific address").
    pub fn insert(&mut self, raw: &str) -> Result<(), SessionError> {
        let address = Address::parse(raw)?;
        let key = address.domain_key();
        self.domains
            .entry(key.clone())
            .or_default()
            .push(address.local.clone());
        self.originals
            .entry(key)
            .or_default()
            .entry(address.local)
            .or_insert_with(|| raw.to_string());
        Ok(())
    }

    pub fn domains(&self) -> impl Iterator<Item = (&str, &DomainUsers)> {
        self.domains.iter().map(|(d, u)| (d.as_str(), u))
    }

    /// The exact-cased `user@domain` string the caller originally supplied
    /// for `local` on `domain_key`, if any was recorded.
    pub fn original_for(&self, domain_key: &str, local: &str) -> Option<&str> {
        self.originals.get(domain_key)?.get(local).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_last_at() {
        let a = Address::parse("a@b@example.com").unwrap();
        assert_eq!(a.local, "a@b");
        assert_eq!(a.domain, "example.com");
    }

    #[test]
    fn rejects_missing_at() {
        assert!(Address::parse("noatsign").is_err());
    }

    #[test]
    fn rejects_empty_domain() {
        assert!(Address::parse("user@").is_err());
    }

    #[test]
    fn domain_case_insensitive_local_case_sensitive() {
        let a = Address::parse("User@Example.com").unwrap();
        let b = Address::parse("User@EXAMPLE.COM").unwrap();
        assert_eq!(a, b);
        let c = Address::parse("user@Example.com").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn batch_dedups_and_preserves_order() {
        let mut batch = DomainBatch::new();
        batch.insert("b@example.com").unwrap();
        batch.insert("a@example.com").unwrap();
        batch.insert("b@example.com").unwrap();
        let (_, users) = batch.domains().next().unwrap();
        assert_eq!(users.iter().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn batch_groups_case_insensitive_domain() {
        let mut batch = DomainBatch::new();
        batch.insert("a@Example.com").unwrap();
        batch.insert("b@example.COM").unwrap();
        assert_eq!(batch.domains().count(), 1);
    }
}
