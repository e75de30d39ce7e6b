//! Typed broker routing keys
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use std::fmt;

/// Topic exchanges declared on the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exchange {
    Notification,
    Driver,
}

impl Exchange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Notification => "notification",
            Exchange::Driver => "driver",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Push notification audiences carried in the third routing-key segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Audience {
    Driver,
    Batch,
    Customer,
    Vendor,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Driver => "driver",
            Audience::Batch => "batch",
            Audience::Customer => "customer",
            Audience::Vendor => "vendor",
        }
    }
}

/// Wallet work targets carried in the third routing-key segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletTarget {
    Bulk,
}

impl WalletTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletTarget::Bulk => "bulk",
        }
    }
}

/// Routing key decoded from a delivered message.
///
/// Keys that do not match a known shape decode to `Unknown` so consumers
/// can log and drop them instead of panicking on a malformed producer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoutingKey {
    NotificationFcm(Audience),
    NotificationWhatsapp,
    NotificationAdmin,
    DriverWallet(WalletTarget),
    Unknown(String),
}

impl RoutingKey {
    /// Decode a raw dot-delimited routing key into its typed form.
    pub fn parse(raw: &str) -> Self {
        match raw.split('.').collect::<Vec<_>>().as_slice() {
            ["notification", "fcm", "driver"] => RoutingKey::NotificationFcm(Audience::Driver),
            ["notification", "fcm", "batch"] => RoutingKey::NotificationFcm(Audience::Batch),
            ["notification", "fcm", "customer"] => RoutingKey::NotificationFcm(Audience::Customer),
            ["notification", "fcm", "vendor"] => RoutingKey::NotificationFcm(Audience::Vendor),
            ["notification", "whatsapp"] => RoutingKey::NotificationWhatsapp,
            ["notification", "admin"] => RoutingKey::NotificationAdmin,
            ["driver", "wallet", "bulk"] => RoutingKey::DriverWallet(WalletTarget::Bulk),
            _ => RoutingKey::Unknown(raw.to_string()),
        }
    }

    /// The exchange a key of this shape belongs to, if known.
    pub fn exchange(&self) -> Option<Exchange> {
        match self {
            RoutingKey::NotificationFcm(_)
            | RoutingKey::NotificationWhatsapp
            | RoutingKey::NotificationAdmin => Some(Exchange::Notification),
            RoutingKey::DriverWallet(_) => Some(Exchange::Driver),
            RoutingKey::Unknown(_) => None,
        }
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingKey::NotificationFcm(audience) => {
                write!(f, "notification.fcm.{}", audience.as_str())
            }
            RoutingKey::NotificationWhatsapp => f.write_str("notification.whatsapp"),
            RoutingKey::NotificationAdmin => f.write_str("notification.admin"),
            RoutingKey::DriverWallet(target) => write!(f, "driver.wallet.{}", target.as_str()),
            RoutingKey::Unknown(raw) => f.write_str(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_keys_round_trip() {
        let keys = [
            RoutingKey::NotificationFcm(Audience::Driver),
            RoutingKey::NotificationFcm(Audience::Batch),
            RoutingKey::NotificationFcm(Audience::Customer),
            RoutingKey::NotificationFcm(Audience::Vendor),
            RoutingKey::NotificationWhatsapp,
            RoutingKey::NotificationAdmin,
            RoutingKey::DriverWallet(WalletTarget::Bulk),
        ];

        for key in keys {
            assert_eq!(RoutingKey::parse(&key.to_string()), key);
        }
    }

    #[test]
    fn test_unknown_key_is_preserved() {
        let key = RoutingKey::parse("notification.fcm.ghost");
        assert_eq!(key, RoutingKey::Unknown("notification.fcm.ghost".to_string()));
        assert_eq!(key.to_string(), "notification.fcm.ghost");
        assert!(key.exchange().is_none());
    }

    #[test]
    fn test_exchange_mapping() {
        assert_eq!(
            RoutingKey::parse("driver.wallet.bulk").exchange(),
            Some(Exchange::Driver)
        );
        assert_eq!(
            RoutingKey::parse("notification.whatsapp").exchange(),
            Some(Exchange::Notification)
        );
    }
}
