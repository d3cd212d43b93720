//! Identifier newtypes.
//!
//! Shops, orders and menu items are all keyed by UUIDs on the wire. Wrapping
//! them keeps a shop id from being passed where an order id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(pub Uuid);

		impl $name {
			/// Returns the underlying UUID.
			pub fn as_uuid(&self) -> &Uuid {
				&self.0
			}
		}

		impl From<Uuid> for $name {
			fn from(id: Uuid) -> Self {
				Self(id)
			}
		}

		impl FromStr for $name {
			type Err = uuid::Error;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Uuid::parse_str(s).map(Self)
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}
	};
}

uuid_id!(
	/// Identifier of a shop. Owned by the external Shop service.
	ShopId
);

uuid_id!(
	/// Identifier of an order, generated when the order is constructed.
	OrderId
);

uuid_id!(
	/// Identifier of a menu item. Owned by the external Menu service.
	MenuItemId
);

impl OrderId {
	/// Generates a fresh random order id.
	pub fn generate() -> Self {
		Self(Uuid::new_v4())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_and_display() {
		let raw = "11111111-1111-1111-1111-111111111111";
		let shop: ShopId = raw.parse().unwrap();
		assert_eq!(shop.to_string(), raw);
		assert!("not-a-uuid".parse::<ShopId>().is_err());
	}

	#[test]
	fn test_serde_is_transparent() {
		let id = MenuItemId(Uuid::nil());
		let json = serde_json::to_string(&id).unwrap();
		assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
	}

	#[test]
	fn test_generated_ids_are_unique() {
		assert_ne!(OrderId::generate(), OrderId::generate());
	}
}
