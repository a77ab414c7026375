//! Runtime installer for dynamically registered classes
//!
//! A [`Class`] is a named member table: callable methods, plain attributes and
//! an optional constructor. [`install`] walks the members present at the time
//! of the call and replaces each eligible method with [`Tracer::wrap`] of it.
//! Several installers may run against the same class; each wraps whatever
//! method value is current.

use crate::error::TraceError;
use crate::tracer::Tracer;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Member name that is never wrapped, whatever it holds
pub const CONSTRUCTOR_NAME: &str = "constructor";

/// Instance method: receiver plus positional arguments
pub type Method<R> = Arc<dyn Fn(&R, &[Value]) -> anyhow::Result<Value> + Send + Sync>;

/// Constructor producing a fresh receiver
pub type Constructor<R> = Arc<dyn Fn(&[Value]) -> anyhow::Result<R> + Send + Sync>;

/// One entry of the member table
pub enum Member<R> {
    /// Callable instance method
    Method(Method<R>),
    /// Non-callable value
    Attribute(Value),
}

impl<R> Clone for Member<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Method(method) => Self::Method(Arc::clone(method)),
            Self::Attribute(value) => Self::Attribute(value.clone()),
        }
    }
}

impl<R> fmt::Debug for Member<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Method(_) => f.write_str("Method(..)"),
            Self::Attribute(value) => f.debug_tuple("Attribute").field(value).finish(),
        }
    }
}

/// Named member table for receivers of type `R`
pub struct Class<R> {
    name: String,
    constructor: Option<Constructor<R>>,
    members: Vec<(String, Member<R>)>,
}

impl<R> Class<R> {
    /// Empty class called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructor: None,
            members: Vec::new(),
        }
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register the constructor
    pub fn with_constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(constructor));
        self
    }

    /// Define or replace a method, keeping the original position on replace
    pub fn define_method<F>(&mut self, name: impl Into<String>, method: F) -> &mut Self
    where
        F: Fn(&R, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.set(name.into(), Member::Method(Arc::new(method)));
        self
    }

    /// Define or replace a plain attribute
    pub fn define_attribute(&mut self, name: impl Into<String>, value: impl Serialize) -> &mut Self {
        let value = crate::serialize::safe_to_value(&value);
        self.set(name.into(), Member::Attribute(value));
        self
    }

    /// Member by name
    pub fn member(&self, name: &str) -> Option<&Member<R>> {
        self.members
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, member)| member)
    }

    /// Member names in definition order
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(name, _)| name.as_str())
    }

    /// Attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        match self.member(name)? {
            Member::Attribute(value) => Some(value),
            Member::Method(_) => None,
        }
    }

    /// Build a receiver through the registered constructor
    pub fn construct(&self, args: &[Value]) -> anyhow::Result<R> {
        let constructor = self
            .constructor
            .as_ref()
            .ok_or_else(|| TraceError::MissingConstructor {
                class: self.name.clone(),
            })?;
        constructor(args)
    }

    /// Call the method `name` on `receiver`
    pub fn invoke(&self, receiver: &R, name: &str, args: &[Value]) -> anyhow::Result<Value> {
        match self.member(name) {
            Some(Member::Method(method)) => method(receiver, args),
            Some(Member::Attribute(_)) => Err(TraceError::not_callable(&self.name, name).into()),
            None => Err(TraceError::unknown_member(&self.name, name).into()),
        }
    }

    fn set(&mut self, name: String, member: Member<R>) {
        match self.members.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = member,
            None => self.members.push((name, member)),
        }
    }
}

impl<R> fmt::Debug for Class<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("constructor", &self.constructor.is_some())
            .field("members", &self.members)
            .finish()
    }
}

/// Why a member was left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The member is the constructor
    Constructor,
    /// Listed in the disabled method set
    Disabled,
    /// Plain attribute
    NotCallable,
}

/// Outcome of one [`install`] run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Wrapped method names, in definition order
    pub wrapped: Vec<String>,
    /// Untouched member names with the reason
    pub skipped: Vec<(String, SkipReason)>,
}

impl InstallReport {
    /// Whether `name` was wrapped by this run
    pub fn is_wrapped(&self, name: &str) -> bool {
        self.wrapped.iter().any(|wrapped| wrapped == name)
    }
}

impl Tracer {
    /// Instrumented replacement for `original`.
    ///
    /// An `Err` from `original` propagates unchanged and skips the post-call
    /// measurements.
    pub fn wrap<R: 'static>(self: &Arc<Self>, method: &str, original: Method<R>) -> Method<R> {
        let tracer = Arc::clone(self);
        let method = method.to_string();
        Arc::new(move |receiver: &R, args: &[Value]| {
            tracer.try_call(&method, || args.to_vec(), || original(receiver, args))
        })
    }
}

/// Wrap every eligible method currently defined on `class`
pub fn install<R: 'static>(class: &mut Class<R>, tracer: &Tracer) -> InstallReport {
    let tracer = Arc::new(tracer.clone());
    let config = tracer.config();
    let mut report = InstallReport::default();

    for (name, member) in class.members.iter_mut() {
        let name = name.as_str();
        let reason = match member {
            _ if name == CONSTRUCTOR_NAME => Some(SkipReason::Constructor),
            Member::Attribute(_) => Some(SkipReason::NotCallable),
            Member::Method(_) if config.is_disabled(name) => Some(SkipReason::Disabled),
            Member::Method(original) => {
                *original = tracer.wrap(name, Arc::clone(original));
                None
            }
        };
        match reason {
            Some(reason) => report.skipped.push((name.to_string(), reason)),
            None => report.wrapped.push(name.to_string()),
        }
    }

    tracing::debug!(
        class = %class.name,
        layer = %tracer.layer(),
        wrapped = ?report.wrapped,
        skipped = report.skipped.len(),
        "Installed tracer"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TraceConfig;
    use crate::sink::{MemorySink, Severity};
    use serde_json::json;

    struct Counter {
        base: i64,
    }

    fn counter_class() -> Class<Counter> {
        let mut class = Class::new("CounterService").with_constructor(|args: &[Value]| {
            Ok(Counter {
                base: args.first().and_then(Value::as_i64).unwrap_or(0),
            })
        });
        class
            .define_method("add", |c: &Counter, args: &[Value]| {
                let n = args.first().and_then(Value::as_i64).unwrap_or(0);
                Ok(json!(c.base + n))
            })
            .define_method("health", |_: &Counter, _: &[Value]| Ok(json!("ok")))
            .define_method("fail", |_: &Counter, _: &[Value]| {
                Err(anyhow::anyhow!("refused"))
            })
            .define_attribute("version", "1.2.0");
        class
    }

    fn tracer(config: TraceConfig, sink: &MemorySink) -> Tracer {
        Tracer::builder("CounterService", config)
            .with_sink(Arc::new(sink.clone()))
            .build()
    }

    #[test]
    fn test_install_wraps_eligible_methods() {
        let sink = MemorySink::new();
        let mut class = counter_class();
        let report = install(&mut class, &tracer(TraceConfig::default().disable("health"), &sink));

        assert_eq!(report.wrapped, vec!["add".to_string(), "fail".to_string()]);
        assert_eq!(
            report.skipped,
            vec![
                ("health".to_string(), SkipReason::Disabled),
                ("version".to_string(), SkipReason::NotCallable),
            ]
        );

        let counter = class.construct(&[json!(10)]).unwrap();
        assert_eq!(class.invoke(&counter, "add", &[json!(5)]).unwrap(), json!(15));
        assert_eq!(
            sink.entries(),
            vec![(
                Severity::Info,
                r#"{"layer":"Service","path":"CounterService.add","args":[5]}"#.to_string()
            )]
        );

        sink.clear();
        assert_eq!(class.invoke(&counter, "health", &[]).unwrap(), json!("ok"));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_attributes_untouched() {
        let sink = MemorySink::new();
        let mut class = counter_class();
        install(&mut class, &tracer(TraceConfig::default(), &sink));

        assert_eq!(class.attribute("version"), Some(&json!("1.2.0")));
        let counter = class.construct(&[]).unwrap();
        let err = class.invoke(&counter, "version", &[]).unwrap_err();
        assert!(err.to_string().contains("not callable"));
    }

    #[test]
    fn test_constructor_member_skipped() {
        let sink = MemorySink::new();
        let mut class = counter_class();
        class.define_method(CONSTRUCTOR_NAME, |_: &Counter, _: &[Value]| Ok(Value::Null));

        let report = install(&mut class, &tracer(TraceConfig::default(), &sink));
        assert!(report
            .skipped
            .contains(&(CONSTRUCTOR_NAME.to_string(), SkipReason::Constructor)));

        let counter = class.construct(&[]).unwrap();
        class.invoke(&counter, CONSTRUCTOR_NAME, &[]).unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_error_skips_post_call_records() {
        let sink = MemorySink::new();
        let mut class = counter_class();
        install(
            &mut class,
            &tracer(TraceConfig::default().with_measure_time(true), &sink),
        );

        let counter = class.construct(&[]).unwrap();
        let err = class.invoke(&counter, "fail", &[json!("x")]).unwrap_err();
        assert_eq!(err.to_string(), "refused");
        assert_eq!(sink.len(), 1);
        assert!(sink.messages_with(Severity::Info)[0].contains("CounterService.fail"));
    }

    #[test]
    fn test_stacked_installers_each_wrap_once() {
        let first = MemorySink::new();
        let second = MemorySink::new();
        let mut class = counter_class();

        install(&mut class, &tracer(TraceConfig::default(), &first));
        install(
            &mut class,
            &tracer(TraceConfig::default().with_measure_time(true), &second),
        );

        let counter = class.construct(&[json!(1)]).unwrap();
        assert_eq!(class.invoke(&counter, "add", &[json!(1)]).unwrap(), json!(2));

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 2);
        assert!(second.entries()[1].1.contains("Execution time"));
    }

    #[test]
    fn test_methods_added_later_are_not_wrapped() {
        let sink = MemorySink::new();
        let mut class = counter_class();
        install(&mut class, &tracer(TraceConfig::default(), &sink));

        class.define_method("late", |_: &Counter, _: &[Value]| Ok(json!(true)));
        let counter = class.construct(&[]).unwrap();
        assert_eq!(class.invoke(&counter, "late", &[]).unwrap(), json!(true));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_empty_class_installs_cleanly() {
        let sink = MemorySink::new();
        let mut class: Class<()> = Class::new("Empty");
        let report = install(&mut class, &tracer(TraceConfig::default(), &sink));
        assert_eq!(report, InstallReport::default());
        assert!(class.construct(&[]).is_err());
    }

    #[test]
    fn test_unknown_member() {
        let class = counter_class();
        let counter = class.construct(&[]).unwrap();
        let err = class.invoke(&counter, "missing", &[]).unwrap_err();
        assert_eq!(err.to_string(), "CounterService has no member `missing`");
    }
}
