//! Test-only constructors for the ordered structures the compiler builds
//! everywhere: projection shapes, grouped accumulators, and JS scopes.
//! Keys are written bare and insertion order is the written order.

/// A [`Reshape`](crate::workflow::Reshape) from `name => item` pairs.
#[cfg(test)]
#[macro_export]
macro_rules! reshape {
	($($key:expr => $item:expr),* $(,)?) => {{
		#[allow(unused_mut)]
		let mut items = linked_hash_map::LinkedHashMap::new();
		$(
			items.insert($key.to_string(), $item);
		)*
		$crate::workflow::Reshape::new(items.into())
	}};
}

/// A [`Grouped`](crate::workflow::Grouped) from `name => accumulator` pairs.
#[cfg(test)]
#[macro_export]
macro_rules! grouped {
	($($key:expr => $acc:expr),* $(,)?) => {{
		#[allow(unused_mut)]
		let mut items = linked_hash_map::LinkedHashMap::new();
		$(
			items.insert($key.to_string(), $acc);
		)*
		$crate::workflow::Grouped::new(items.into())
	}};
}

/// A [`Scope`](crate::workflow::Scope) from `identifier => value` pairs.
#[cfg(test)]
#[macro_export]
macro_rules! scope {
	($($name:expr => $value:expr),* $(,)?) => {{
		#[allow(unused_mut)]
		let mut scope = $crate::workflow::Scope::new();
		$(
			scope.insert($name.to_string(), $value);
		)*
		scope
	}};
}
