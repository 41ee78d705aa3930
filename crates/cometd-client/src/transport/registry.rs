use std::collections::HashMap;

use super::Transport;

/// Transports by type, in priority order (lower index wins).
#[derive(Default)]
pub struct TransportRegistry {
    types: Vec<String>,
    transports: HashMap<String, Box<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            transports: HashMap::new(),
        }
    }

    /// Register `transport` under `transport_type` unless the type is taken.
    /// `index` past the end (or `None`) appends with the lowest priority.
    pub fn add(
        &mut self,
        transport_type: &str,
        transport: Box<dyn Transport>,
        index: Option<usize>,
    ) -> bool {
        if self.transports.contains_key(transport_type) {
            return false;
        }

        match index {
            Some(i) if i < self.types.len() => self.types.insert(i, transport_type.to_string()),
            _ => self.types.push(transport_type.to_string()),
        }
        self.transports.insert(transport_type.to_string(), transport);
        true
    }

    pub fn remove(&mut self, transport_type: &str) -> Option<Box<dyn Transport>> {
        let idx = self.types.iter().position(|t| t == transport_type)?;
        self.types.remove(idx);
        self.transports.remove(transport_type)
    }

    pub fn get(&self, transport_type: &str) -> Option<&dyn Transport> {
        self.transports.get(transport_type).map(|t| t.as_ref())
    }

    pub fn get_mut(&mut self, transport_type: &str) -> Option<&mut (dyn Transport + 'static)> {
        self.transports.get_mut(transport_type).map(|t| t.as_mut())
    }

    pub fn transport_types(&self) -> Vec<String> {
        self.types.clone()
    }

    /// Registered types accepting `(version, cross_domain)`, in priority order.
    pub fn find_transport_types(&self, version: &str, cross_domain: bool) -> Vec<String> {
        self.types
            .iter()
            .filter(|t| {
                self.transports
                    .get(t.as_str())
                    .is_some_and(|tr| tr.accept(version, cross_domain))
            })
            .cloned()
            .collect()
    }

    /// First registered type (priority order) that is also a candidate and
    /// accepts `(version, cross_domain)`.
    pub fn negotiate_transport(
        &self,
        candidates: &[String],
        version: &str,
        cross_domain: bool,
    ) -> Option<&str> {
        self.types
            .iter()
            .filter(|t| candidates.iter().any(|c| c == *t))
            .find(|t| {
                self.transports
                    .get(t.as_str())
                    .is_some_and(|tr| tr.accept(version, cross_domain))
            })
            .map(String::as_str)
    }

    pub fn reset(&mut self) {
        for t in self.transports.values_mut() {
            t.reset();
        }
    }
}
