/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt::{self, Write};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::WireError;

pub const FQN_DELIMITER: char = '/';

/// Identity of a metric: `host/agent/namespace.../name`
#[derive(Debug, Clone)]
pub struct MetricName {
    host: String,
    agent: String,
    namespace: Vec<String>,
    name: String,
    fqn: String,
}

impl MetricName {
    pub fn new<S: Into<String>>(
        host: S,
        agent: S,
        namespace: Vec<String>,
        name: S,
    ) -> Result<Self, WireError> {
        let host = host.into();
        let agent = agent.into();
        let name = name.into();
        check_segment(&host, "empty host")?;
        check_segment(&agent, "empty agent")?;
        check_segment(&name, "empty metric name")?;
        for ns in &namespace {
            check_segment(ns, "empty namespace segment")?;
        }

        let mut fqn = String::with_capacity(host.len() + agent.len() + name.len() + 16);
        fqn.push_str(&host);
        fqn.push(FQN_DELIMITER);
        fqn.push_str(&agent);
        for ns in &namespace {
            fqn.push(FQN_DELIMITER);
            fqn.push_str(ns);
        }
        fqn.push(FQN_DELIMITER);
        fqn.push_str(&name);

        Ok(MetricName {
            host,
            agent,
            namespace,
            name,
            fqn,
        })
    }

    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[inline]
    pub fn agent(&self) -> &str {
        &self.agent
    }

    #[inline]
    pub fn namespace(&self) -> &[String] {
        &self.namespace
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn fqn(&self) -> &str {
        &self.fqn
    }

    /// The name without host and agent, joined by `delimiter`
    pub fn local_display(&self, delimiter: char) -> LocalNameDisplay<'_> {
        LocalNameDisplay {
            name: self,
            delimiter,
        }
    }

    /// A copy with host and agent replaced
    pub fn retag(&self, host: &str, agent: &str) -> Result<Self, WireError> {
        MetricName::new(
            host.to_string(),
            agent.to_string(),
            self.namespace.clone(),
            self.name.clone(),
        )
    }
}

fn check_segment(s: &str, reason: &'static str) -> Result<(), WireError> {
    if s.is_empty() {
        return Err(WireError::InvalidName(reason));
    }
    if s.contains(FQN_DELIMITER) {
        return Err(WireError::InvalidName("delimiter in segment"));
    }
    Ok(())
}

impl FromStr for MetricName {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments: Vec<String> = s.split(FQN_DELIMITER).map(|s| s.to_string()).collect();
        if segments.len() < 3 {
            return Err(WireError::InvalidName("too few segments"));
        }
        let name = segments.pop().unwrap_or_default();
        let mut iter = segments.into_iter();
        let host = iter.next().unwrap_or_default();
        let agent = iter.next().unwrap_or_default();
        MetricName::new(host, agent, iter.collect(), name)
    }
}

impl PartialEq for MetricName {
    fn eq(&self, other: &Self) -> bool {
        self.fqn == other.fqn
    }
}

impl Eq for MetricName {}

impl Hash for MetricName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fqn.hash(state)
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fqn)
    }
}

pub struct LocalNameDisplay<'a> {
    name: &'a MetricName,
    delimiter: char,
}

impl fmt::Display for LocalNameDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ns in &self.name.namespace {
            f.write_str(ns)?;
            f.write_char(self.delimiter)?;
        }
        f.write_str(&self.name.name)
    }
}
