//! Account selection
//!
//! Chooses which loaded keys take part in a run and pairs each with a proxy.

use crate::config::SettingsConfig;
use crate::error::{InputError, InputResult};
use crate::infrastructure::proxy::Proxy;
use std::collections::HashSet;

/// One wallet scheduled for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSpec {
    /// 1-based position in the key file
    pub account_index: usize,
    pub wallet_id: String,
    pub proxy: Option<Proxy>,
}

/// Apply `accounts_range` / `exact_accounts_to_use` and cycle proxies.
///
/// `accounts_range = [start, end]` is 1-based and inclusive. When it is
/// `[0, 0]`, `exact_accounts_to_use` is used if non-empty, otherwise every key.
/// Proxies are assigned as `proxies[i % len]` over the selected accounts.
pub fn select_accounts(
    keys: &[String],
    proxies: &[Proxy],
    settings: &SettingsConfig,
) -> InputResult<Vec<AccountSpec>> {
    let indices: Vec<usize> = match settings.accounts_range {
        [0, 0] if settings.exact_accounts_to_use.is_empty() => (1..=keys.len()).collect(),
        [0, 0] => {
            let mut exact = settings.exact_accounts_to_use.clone();
            if let Some(bad) = exact.iter().find(|&&n| n == 0 || n > keys.len()) {
                return Err(InputError::Selection(format!(
                    "account {} requested but {} keys loaded",
                    bad,
                    keys.len()
                )));
            }
            let mut seen = HashSet::new();
            exact.retain(|n| seen.insert(*n));
            exact
        }
        [start, end] => {
            if start == 0 || start > end || end > keys.len() {
                return Err(InputError::Selection(format!(
                    "range [{}, {}] with {} keys loaded",
                    start,
                    end,
                    keys.len()
                )));
            }
            (start..=end).collect()
        }
    };

    Ok(indices
        .into_iter()
        .enumerate()
        .map(|(i, account_index)| AccountSpec {
            account_index,
            wallet_id: keys[account_index - 1].clone(),
            proxy: (!proxies.is_empty()).then(|| proxies[i % proxies.len()].clone()),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keys(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("key{}", i)).collect()
    }

    fn proxies() -> Vec<Proxy> {
        vec!["1.1.1.1:80".parse().unwrap(), "2.2.2.2:80".parse().unwrap()]
    }

    #[test]
    fn test_all_accounts_cycle_proxies() {
        let settings = SettingsConfig::default();
        let selected = select_accounts(&keys(3), &proxies(), &settings).unwrap();
        let hosts: Vec<&str> = selected
            .iter()
            .map(|a| a.proxy.as_ref().unwrap().host.as_str())
            .collect();
        assert_eq!(hosts, vec!["1.1.1.1", "2.2.2.2", "1.1.1.1"]);
        assert_eq!(selected[2].account_index, 3);
        assert_eq!(selected[2].wallet_id, "key3");
    }

    #[test]
    fn test_range_selection() {
        let settings = SettingsConfig {
            accounts_range: [2, 3],
            ..Default::default()
        };
        let selected = select_accounts(&keys(5), &proxies(), &settings).unwrap();
        let indices: Vec<usize> = selected.iter().map(|a| a.account_index).collect();
        assert_eq!(indices, vec![2, 3]);
        assert_eq!(selected[0].proxy.as_ref().unwrap().host, "1.1.1.1");
    }

    #[test]
    fn test_exact_selection() {
        let settings = SettingsConfig {
            exact_accounts_to_use: vec![4, 1],
            ..Default::default()
        };
        let selected = select_accounts(&keys(5), &[], &settings).unwrap();
        assert_eq!(selected[0].wallet_id, "key4");
        assert_eq!(selected[1].wallet_id, "key1");
        assert!(selected[0].proxy.is_none());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let settings = SettingsConfig {
            accounts_range: [2, 9],
            ..Default::default()
        };
        assert!(select_accounts(&keys(3), &proxies(), &settings).is_err());

        let settings = SettingsConfig {
            exact_accounts_to_use: vec![7],
            ..Default::default()
        };
        assert!(select_accounts(&keys(3), &proxies(), &settings).is_err());
    }
}
