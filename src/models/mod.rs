// Fieldless enum carried on the wire and on the command line by name
macro_rules! named_enum {
    ($(#[$meta:meta])* pub enum $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $crate::models::NamedVariant for $name {
            const VARIANTS: &'static [Self] = &[$(Self::$variant),+];

            fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::models::NamedVariant::name(self))
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                <Self as $crate::models::NamedVariant>::parse_name(value).ok_or_else(|| {
                    format!(
                        "`{}` is not one of {}",
                        value,
                        <Self as $crate::models::NamedVariant>::names().join(", ")
                    )
                })
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str($crate::models::NamedVariant::name(self))
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = String::deserialize(deserializer)?;
                value.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

pub mod account;
pub mod config;
pub mod session;
pub mod user;

pub use account::{
    AssetAccountStatus, AssetAccountType, DepositAssetAccount, InvestorAssetAccount,
    InvestorAssetAccountBasicInfo, WithdrawAssetAccount,
};
pub use config::AppConfig;
pub use session::TokenState;
pub use user::{ClientTier, User, UserRole};

/// Enums exchanged with the backends by variant name
pub trait NamedVariant: Sized + Copy + 'static {
    const VARIANTS: &'static [Self];

    fn name(&self) -> &'static str;

    /// Case-insensitive lookup, as typed on the command line
    fn parse_name(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::VARIANTS
            .iter()
            .copied()
            .find(|v| v.name().eq_ignore_ascii_case(value))
    }

    fn names() -> Vec<&'static str> {
        Self::VARIANTS.iter().map(|v| v.name()).collect()
    }
}
