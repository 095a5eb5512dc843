//! PAC artifact rendering.
//!
//! Assembles the complete proxy auto-config JavaScript: the embedded lookup
//! helpers, the hashed bucket array, the bypass conditions, and the
//! proxy-balancing logic. The JS bodies are a compatibility contract with
//! deployed evaluators: the doubling loop in `hash_masked_ip` (which keeps
//! the modulo over exact integers instead of 32-bit signed shifts) and the
//! double-masked 16-bit hostname checksum must be emitted exactly as they
//! are.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnet::Ipv4Net;

use crate::error::{PacError, Result};
use crate::table::{masked_value, LookupTable};

/// Proxy balancing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Balance {
    /// Join all directives into a single ordered return value
    #[default]
    No,
    /// Rotate the proxy list keyed on the last octet of the client address
    LocalIp,
    /// Rotate the proxy list keyed on a 16-bit checksum of the hostname
    Host,
}

impl FromStr for Balance {
    type Err = PacError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "no" => Ok(Balance::No),
            "local_ip" => Ok(Balance::LocalIp),
            "host" => Ok(Balance::Host),
            other => Err(PacError::ConfigError(format!(
                "unknown balance policy: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Balance::No => write!(f, "no"),
            Balance::LocalIp => write!(f, "local_ip"),
            Balance::Host => write!(f, "host"),
        }
    }
}

/// One proxy-bypass entry, classified for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BypassRule {
    /// Literal address: equality test against the resolved IP
    Address(Ipv4Addr),
    /// CIDR network: containment test against (network, dotted netmask)
    Network(Ipv4Net),
    /// Anything else: equality test against the literal hostname
    Hostname(String),
}

impl BypassRule {
    /// Classify a raw entry: try address, try CIDR, fall back to hostname.
    pub fn classify(entry: &str) -> Self {
        let entry = entry.trim();
        if let Ok(ip) = entry.parse::<Ipv4Addr>() {
            return BypassRule::Address(ip);
        }
        if let Ok(net) = entry.parse::<Ipv4Net>() {
            return BypassRule::Network(net);
        }
        BypassRule::Hostname(entry.to_string())
    }

    fn condition(&self) -> Result<String> {
        match self {
            BypassRule::Address(ip) => Ok(format!(" ip == {} ||", js_str(&ip.to_string())?)),
            BypassRule::Network(net) => Ok(format!(
                " isInNet(ip, {}, {}) ||",
                js_str(&net.network().to_string())?,
                js_str(&net.netmask().to_string())?
            )),
            BypassRule::Hostname(name) => Ok(format!(" host == {} ||", js_str(name)?)),
        }
    }
}

/// JSON-escape a string into a JS string literal.
fn js_str(s: &str) -> Result<String> {
    Ok(serde_json::to_string(s)?)
}

/// Render one short-circuit condition per bypass entry.
pub fn bypass_conditions(entries: &[String]) -> Result<String> {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&BypassRule::classify(entry).condition()?);
    }
    Ok(out)
}

/// Render the directive-selection logic for the configured balance policy.
pub fn balance_snippet(proxies: &[String], balance: Balance) -> Result<String> {
    match balance {
        Balance::No => Ok(format!("return {} ;", js_str(&proxies.join(";"))?)),
        Balance::LocalIp => Ok(format!(
            "{}\n  return local_ip_balance([{}]);\n",
            LOCAL_IP_BALANCE_FN,
            proxy_list(proxies)?
        )),
        Balance::Host => Ok(format!(
            "{}\n  return target_host_balance([{}], host);\n",
            HOST_BALANCE_FN,
            proxy_list(proxies)?
        )),
    }
}

fn proxy_list(proxies: &[String]) -> Result<String> {
    let literals: Result<Vec<String>> = proxies.iter().map(|p| js_str(p)).collect();
    Ok(literals?.join(","))
}

/// Prefix lengths that need a `var mN = N;` declaration: the probe walk
/// plus every length actually present in the buckets.
fn prefix_vars(table: &LookupTable) -> Vec<u8> {
    let mut lens = std::collections::BTreeSet::new();
    if table.min_prefix() <= table.max_prefix() {
        let mut p = table.min_prefix();
        loop {
            lens.insert(p);
            match p.checked_add(table.step()) {
                Some(next) if next <= table.max_prefix() => p = next,
                _ => break,
            }
        }
    }
    for bucket in table.buckets() {
        for net in bucket {
            lens.insert(net.prefix_len());
        }
    }
    lens.into_iter().collect()
}

/// Render the complete PAC artifact for a built table.
///
/// Two renders of the same table and configuration produce identical output.
pub fn render(
    table: &LookupTable,
    proxies: &[String],
    balance: Balance,
    no_proxy: &[String],
) -> Result<String> {
    let mut pac = String::with_capacity(PAC_HELPERS.len() + table.entry_count() * 32);

    pac.push_str(PAC_HELPERS);

    pac.push_str(&format!(
        "\n\n  HASH_BASE = {};\n  MASK_STEP = {};\n  min_prefixlen = {};\n  max_prefixlen = {};\n\n",
        table.bucket_count(),
        table.step(),
        table.min_prefix(),
        table.max_prefix()
    ));

    for len in prefix_vars(table) {
        pac.push_str(&format!("    var m{} = {};\n", len, len));
    }

    pac.push_str("    var empty_array = [];\n    var hashed_nets = [\n");
    for bucket in table.buckets() {
        if bucket.is_empty() {
            pac.push_str("\n        empty_array,");
        } else {
            pac.push_str("\n        [");
            for net in bucket {
                pac.push_str(&format!(
                    "\n            [{}, m{}],",
                    masked_value(net),
                    net.prefix_len()
                ));
            }
            pac.push_str("\n        ],");
        }
    }

    pac.push_str(&format!(
        r#"
    ];

    if (isPlainHostName(host)
     || (host == '127.0.0.1')
     || (host == 'localhost')
     ) {{
        return 'DIRECT';
    }}

    var ip = dnsResolve(host);

    if (ip == null || ip == '' ||{bypass} lookup_ip(ip)) {{
        return 'DIRECT';
    }}

    {balance}

}}
"#,
        bypass = bypass_conditions(no_proxy)?,
        balance = balance_snippet(proxies, balance)?,
    ));

    Ok(pac)
}

/// FindProxyForURL prologue and lookup helpers embedded in every artifact.
const PAC_HELPERS: &str = r#"// Proxy auto-config with hashed IPv4 range lookup

function FindProxyForURL(url, host) {
  var HASH_BASE, MASK_STEP, a, dot2num, hash_masked_ip, hashed_nets, i, lookup_ip, max_prefixlen, min_prefixlen, num2dot, prefixlen2mask, rebuild_net, _i, _j, _len, _len1;

  dot2num = function(dot) {
    var d;
    d = dot.split(".");
    return ((((((+d[0]) * 256) + (+d[1])) * 256) + (+d[2])) * 256) + (+d[3]);
  };

  num2dot = function(ip) {
    return [ip >>> 24, ip >>> 16 & 0xFF, ip >>> 8 & 0xFF, ip & 0xFF].join(".");
  };

  hash_masked_ip = function(ip, mask_len, mod_base) {
    var i, net, offset, _i;
    offset = 32 - mask_len;
    net = ip >>> offset;
    for (i = _i = 0; 0 <= offset ? _i < offset : _i > offset; i = 0 <= offset ? ++_i : --_i) {
      net *= 2;
    }
    return net % mod_base;
  };

  prefixlen2mask = function(prefixlen) {
    var imask;
    imask = 0xFFFFFFFF << (32 - prefixlen);
    return (imask >> 24 & 0xFF) + '.' + (imask >> 16 & 0xFF) + '.' + (imask >> 8 & 0xFF) + '.' + (imask & 0xFF);
  };

  rebuild_net = function(pair) {
    var masks, result;
    result = ['', ''];
    result[0] = num2dot(pair[0] << (32 - pair[1]));
    result[1] = prefixlen2mask(pair[1]);
    return result;
  };

  lookup_ip = function(ip) {
    var i, k, len, n, n_ip, _i, _len, _ref;
    len = min_prefixlen;
    n_ip = dot2num(ip);
    while (len <= max_prefixlen) {
      k = hash_masked_ip(n_ip, len, HASH_BASE);
      _ref = hashed_nets[k];
      for (_i = 0, _len = _ref.length; _i < _len; _i++) {
        i = _ref[_i];
        n = rebuild_net(i);
        if (isInNet(ip,n[0],n[1])) {
          return true;
        }
      }
      len += MASK_STEP;
    }
    return false;
  };"#;

const LOCAL_IP_BALANCE_FN: &str = r#"
  var local_ip_balance = function(proxies) {
    var i, k, l, myseg, s, _i;
    myseg = parseInt(myIpAddress().split(".")[3]);
    l = proxies.length;
    k = myseg % l;
    s = '';
    for (i = _i = 0; 0 <= l ? _i < l : _i > l; i = 0 <= l ? ++_i : --_i) {
      s += proxies[(k + i) % l];
    }
    return s;
  };
"#;

const HOST_BALANCE_FN: &str = r#"
  var target_host_balance = function(proxies, host) {
    var hash_string, i, k, l, s, _i;
    hash_string = function(s) {
      var c, hash, _i, _len;
      hash = 0;
      for (_i = 0, _len = s.length; _i < _len; _i++) {
        c = s[_i];
        hash = (hash << 5) - hash + c.charCodeAt(0);
        hash = hash & hash & 0xFFFF;
        hash &= 0xFFFF;
      }
      return hash;
    };
    l = proxies.length;
    k = hash_string(host) % l;
    s = '';
    for (i = _i = 0; 0 <= l ? _i < l : _i > l; i = 0 <= l ? ++_i : --_i) {
      s += proxies[(k + i) % l];
    }
    return s;
  };
"#;
