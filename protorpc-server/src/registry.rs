//! Service registry.
//!
//! Maps canonical method names (`ArithService.Add`) to their descriptors and
//! canonical service names (`ArithService`) to the service that answers them.
//! Populated before serving and read-only afterwards.

use crate::error::ServerError;
use protorpc_protocol::{camel_case, MethodDescriptor, Service};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct Registry {
    methods: HashMap<String, MethodDescriptor>,
    services: HashMap<String, Arc<dyn Service>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every method of `service`.
    ///
    /// Fails without changing the registry when the canonical service name
    /// is already taken, a method name repeats, or a descriptor names
    /// another service.
    pub fn register(&mut self, service: Arc<dyn Service>) -> Result<(), ServerError> {
        let name = camel_case(service.name());
        if self.services.contains_key(&name) {
            return Err(ServerError::DuplicateService(name));
        }

        let mut methods = HashMap::new();
        for method in service.methods() {
            if method.service_name() != name {
                return Err(ServerError::ForeignMethod {
                    service: name,
                    method: method.to_string(),
                });
            }
            let canonical = method.canonical_name();
            if methods.contains_key(&canonical) || self.methods.contains_key(&canonical) {
                return Err(ServerError::DuplicateMethod(canonical));
            }
            methods.insert(canonical, method);
        }

        tracing::debug!("Registered service {} ({} methods)", name, methods.len());
        self.methods.extend(methods);
        self.services.insert(name, service);
        Ok(())
    }

    /// Looks up the method and owning service for a raw method name.
    ///
    /// `None` when either is unknown.
    pub fn resolve(&self, raw_method: &str) -> Option<(&MethodDescriptor, &Arc<dyn Service>)> {
        let method = self.find_method(raw_method)?;
        let service = self.services.get(&method.service_name())?;
        Some((method, service))
    }

    pub fn find_method(&self, raw_method: &str) -> Option<&MethodDescriptor> {
        self.methods.get(&camel_case(raw_method))
    }

    /// Looks up a service by raw service name, or by the service part of a
    /// raw method name.
    pub fn find_service(&self, raw_name: &str) -> Option<&Arc<dyn Service>> {
        let service = match raw_name.rfind('.') {
            Some(dot) => &raw_name[..dot],
            None => raw_name,
        };
        self.services.get(&camel_case(service))
    }

    /// Canonical method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("methods", &self.method_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protorpc_protocol::{invoke, ProtocolError, Reply};

    struct Counter {
        name: &'static str,
        methods: Vec<(&'static str, &'static str)>,
    }

    impl Service for Counter {
        fn name(&self) -> &str {
            self.name
        }

        fn methods(&self) -> Vec<MethodDescriptor> {
            self.methods
                .iter()
                .map(|(service, method)| MethodDescriptor::new::<u64, u64>(*service, *method))
                .collect()
        }

        fn call_method(
            &self,
            _method: &MethodDescriptor,
            request: &[u8],
        ) -> Result<Reply, ProtocolError> {
            invoke::<u64, u64, _>(request, |n| Ok(n + 1))
        }
    }

    fn counter(name: &'static str, methods: &[(&'static str, &'static str)]) -> Arc<dyn Service> {
        Arc::new(Counter {
            name,
            methods: methods.to_vec(),
        })
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = Registry::new();
        registry
            .register(counter(
                "counter_service",
                &[("counter_service", "incr"), ("counter_service", "get_value")],
            ))
            .unwrap();

        assert_eq!(
            registry.method_names(),
            vec!["CounterService.GetValue", "CounterService.Incr"]
        );

        for raw in [
            "CounterService.Incr",
            "counter_service.incr",
            "counterService.incr",
        ] {
            let (method, service) = registry.resolve(raw).expect(raw);
            assert_eq!(method.method(), "incr");
            assert_eq!(service.name(), "counter_service");
        }
        assert!(registry.resolve("CounterService.Decr").is_none());
        assert!(registry.resolve("").is_none());
    }

    #[test]
    fn test_find_service() {
        let mut registry = Registry::new();
        registry
            .register(counter("counter_service", &[("counter_service", "incr")]))
            .unwrap();
        assert!(registry.find_service("CounterService").is_some());
        assert!(registry.find_service("counter_service.incr").is_some());
        assert!(registry.find_service("EchoService").is_none());
    }

    #[test]
    fn test_duplicate_service_rejected() {
        let mut registry = Registry::new();
        registry
            .register(counter("EchoService", &[("EchoService", "echo")]))
            .unwrap();
        let err = registry
            .register(counter("echo_service", &[("echo_service", "shout")]))
            .unwrap_err();
        assert!(matches!(err, ServerError::DuplicateService(ref n) if n == "EchoService"));
        // Nothing from the rejected service leaks in.
        assert!(registry.find_method("EchoService.Shout").is_none());
        assert_eq!(registry.service_count(), 1);
    }

    #[test]
    fn test_duplicate_method_rejected() {
        let mut registry = Registry::new();
        let err = registry
            .register(counter("S", &[("S", "get_x"), ("S", "GetX")]))
            .unwrap_err();
        assert!(matches!(err, ServerError::DuplicateMethod(ref m) if m == "S.GetX"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_foreign_method_rejected() {
        let mut registry = Registry::new();
        let err = registry
            .register(counter("A", &[("A", "x"), ("B", "y")]))
            .unwrap_err();
        assert!(matches!(err, ServerError::ForeignMethod { .. }));
        assert!(registry.find_method("A.X").is_none());
    }
}
