use std::collections::BTreeSet;

/// Capability of the caller requesting a report.
///
/// Admins see every matched collection. Everyone else only sees collections on which one of their
/// roles holds an active read permission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authz {
	pub is_admin: bool,
	pub roles: BTreeSet<i64>,
}
impl Authz {
	pub fn admin() -> Self {
		Self { is_admin: true, roles: BTreeSet::new() }
	}

	pub fn with_roles<I>(roles: I) -> Self
	where
		I: IntoIterator<Item = i64>,
	{
		Self { is_admin: false, roles: roles.into_iter().collect() }
	}

	pub fn role_ids(&self) -> Vec<i64> {
		self.roles.iter().copied().collect()
	}
}
