//! Opaque identifiers backed by UUID v4.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id! {
    /// Identifier of a tenant.
    ///
    /// # Examples
    ///
    /// ```
    /// use deskgate_core::types::TenantId;
    ///
    /// let id = TenantId::generate();
    /// let parsed: TenantId = id.to_string().parse().unwrap();
    /// assert_eq!(id, parsed);
    /// ```
    TenantId
}

uuid_id! {
    /// Local identifier of a registered store record.
    StoreRecordId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique() {
        assert_ne!(TenantId::generate(), TenantId::generate());
        assert_ne!(StoreRecordId::generate(), StoreRecordId::generate());
    }

    #[test]
    fn test_parse_invalid() {
        assert!("not-a-uuid".parse::<TenantId>().is_err());
    }

    #[test]
    fn test_serde_transparent() {
        let id = TenantId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
