/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use humanize_rs::ParseError;
use yaml_rust::{Yaml, YamlLoader, yaml};

pub(crate) fn normalize_key(raw: &str) -> String {
    raw.to_lowercase().replace('-', "_")
}

/// Call `f` on every document in the file
pub(crate) fn foreach_doc<F>(path: &Path, mut f: F) -> anyhow::Result<()>
where
    F: FnMut(usize, &Yaml) -> anyhow::Result<()>,
{
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read in file {}: {e}", path.display()))?;
    let docs = YamlLoader::load_from_str(&content)
        .map_err(|e| anyhow!("invalid yaml file {}: {e}", path.display()))?;
    for (i, doc) in docs.iter().enumerate() {
        f(i, doc).context(format!("failed to load yaml doc #{i}"))?;
    }
    Ok(())
}

pub(crate) fn foreach_kv<F>(table: &yaml::Hash, mut f: F) -> anyhow::Result<()>
where
    F: FnMut(&str, &Yaml) -> anyhow::Result<()>,
{
    for (k, v) in table.iter() {
        if let Yaml::String(key) = k {
            f(key, v).context(format!("failed to parse value of key {key}"))?;
        } else {
            return Err(anyhow!("key in hash should be string"));
        }
    }
    Ok(())
}

pub(crate) fn hash_get_required_str<'a>(map: &'a yaml::Hash, k: &str) -> anyhow::Result<&'a str> {
    let key = Yaml::String(k.to_owned());
    match map.get(&key) {
        Some(Yaml::String(s)) => Ok(s),
        Some(_) => Err(anyhow!("invalid string value for required key {k}")),
        None => Err(anyhow!("no required key {k} found in this map")),
    }
}

/// Call `f` on each map of a list, a single map is treated as a list of one
pub(crate) fn foreach_map<F>(v: &Yaml, mut f: F) -> anyhow::Result<()>
where
    F: FnMut(&yaml::Hash) -> anyhow::Result<()>,
{
    match v {
        Yaml::Hash(map) => f(map),
        Yaml::Array(seq) => {
            for (i, v) in seq.iter().enumerate() {
                let Yaml::Hash(map) = v else {
                    return Err(anyhow!("list element #{i} should be a map"));
                };
                f(map).context(format!("invalid value for list element #{i}"))?;
            }
            Ok(())
        }
        Yaml::Null => Ok(()),
        _ => Err(anyhow!("yaml value type should be 'map' or 'array'")),
    }
}

pub(crate) fn as_string(v: &Yaml) -> anyhow::Result<String> {
    match v {
        Yaml::String(s) => Ok(s.to_string()),
        Yaml::Integer(i) => Ok(i.to_string()),
        Yaml::Real(s) => Ok(s.to_string()),
        _ => Err(anyhow!(
            "yaml value type for string should be 'string' / 'integer' / 'real'"
        )),
    }
}

pub(crate) fn as_usize(v: &Yaml) -> anyhow::Result<usize> {
    match v {
        Yaml::String(s) => Ok(usize::from_str(s)?),
        Yaml::Integer(i) => Ok(usize::try_from(*i)?),
        _ => Err(anyhow!(
            "yaml value type for 'usize' should be 'string' or 'integer'"
        )),
    }
}

pub(crate) fn as_i64(v: &Yaml) -> anyhow::Result<i64> {
    match v {
        Yaml::String(s) => Ok(i64::from_str(s)?),
        Yaml::Integer(i) => Ok(*i),
        _ => Err(anyhow!(
            "yaml value type for 'i64' should be 'string' or 'integer'"
        )),
    }
}

pub(crate) fn as_bool(v: &Yaml) -> anyhow::Result<bool> {
    match v {
        Yaml::String(s) => match s.to_lowercase().as_str() {
            "on" | "true" | "yes" | "1" => Ok(true),
            "off" | "false" | "no" | "0" => Ok(false),
            _ => Err(anyhow!("invalid yaml string value for 'bool': {s}")),
        },
        Yaml::Boolean(value) => Ok(*value),
        Yaml::Integer(i) => Ok(*i != 0),
        _ => Err(anyhow!(
            "yaml value type for 'bool' should be 'boolean' / 'string' / 'integer'"
        )),
    }
}

pub(crate) fn as_duration(v: &Yaml) -> anyhow::Result<Duration> {
    match v {
        Yaml::String(value) => match humanize_rs::duration::parse(value) {
            Ok(v) => Ok(v),
            Err(ParseError::MissingUnit) => {
                if let Ok(u) = u64::from_str(value) {
                    Ok(Duration::from_secs(u))
                } else if let Ok(f) = f64::from_str(value) {
                    Duration::try_from_secs_f64(f).map_err(anyhow::Error::new)
                } else {
                    Err(anyhow!("invalid duration string"))
                }
            }
            Err(e) => Err(anyhow!("invalid humanize duration string: {e}")),
        },
        Yaml::Integer(value) => {
            if let Ok(u) = u64::try_from(*value) {
                Ok(Duration::from_secs(u))
            } else {
                Err(anyhow!("unsupported duration string"))
            }
        }
        Yaml::Real(s) => {
            let f = f64::from_str(s).map_err(|e| anyhow!("invalid f64 value: {e}"))?;
            Duration::try_from_secs_f64(f).map_err(anyhow::Error::new)
        }
        _ => Err(anyhow!(
            "yaml value type for humanize duration should be 'string' or 'integer' or 'real'"
        )),
    }
}

pub(crate) fn as_sockaddr(v: &Yaml) -> anyhow::Result<SocketAddr> {
    match v {
        Yaml::String(s) => {
            SocketAddr::from_str(s).map_err(|e| anyhow!("invalid socket address {s}: {e}"))
        }
        Yaml::Integer(port) => {
            let port = u16::try_from(*port).map_err(|_| anyhow!("out of range port {port}"))?;
            Ok(SocketAddr::from(([0, 0, 0, 0], port)))
        }
        _ => Err(anyhow!(
            "yaml value type for 'socket address' should be 'string' or 'integer'"
        )),
    }
}

pub(crate) fn as_list<T, F>(v: &Yaml, convert: F) -> anyhow::Result<Vec<T>>
where
    F: Fn(&Yaml) -> anyhow::Result<T>,
{
    let mut vec = Vec::new();
    match v {
        Yaml::Array(seq) => {
            for (i, v) in seq.iter().enumerate() {
                let node = convert(v).context(format!("invalid value for list element #{i}"))?;
                vec.push(node);
            }
        }
        _ => {
            let node = convert(v).context("invalid single value for the list")?;
            vec.push(node);
        }
    }
    Ok(vec)
}

#[cfg(test)]
pub(crate) fn load_test_doc(s: &str) -> Yaml {
    let mut docs = YamlLoader::load_from_str(s).unwrap();
    docs.remove(0)
}
