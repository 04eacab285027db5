//! Routing table implementation

use crate::error::RouteError;
use crate::next_hop::{InterfaceId, RouteEntry};
use mesh_wire::Address;
use tracing::debug;

/// Default number of address slots
pub const DEFAULT_MAX_NODES: usize = 64;

/// Address-indexed routing table
#[derive(Debug, Clone)]
pub struct RoutingTable {
    /// One slot per address below the table capacity
    routes: Vec<Option<RouteEntry>>,
    /// Number of occupied slots
    count: usize,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NODES)
    }
}

impl RoutingTable {
    /// Create a table with slots for addresses `0..max_nodes`
    pub fn new(max_nodes: usize) -> Self {
        Self {
            routes: vec![None; max_nodes.min(usize::from(u8::MAX) + 1)],
            count: 0,
        }
    }

    /// Number of address slots
    pub fn capacity(&self) -> usize {
        self.routes.len()
    }

    fn slot(&self, address: Address) -> Result<usize, RouteError> {
        let index = usize::from(address.get());
        if address.is_reserved() || index >= self.routes.len() {
            return Err(RouteError::BadAddress(address));
        }
        Ok(index)
    }

    /// Add a route with an unknown hop count
    pub fn add(&mut self, address: Address, interface: InterfaceId) -> Result<(), RouteError> {
        self.insert(RouteEntry::new(address, interface))
    }

    /// Add a route with a known hop count
    pub fn add_with_hops(
        &mut self,
        address: Address,
        interface: InterfaceId,
        hops: u8,
    ) -> Result<(), RouteError> {
        self.insert(RouteEntry::with_hops(address, interface, hops))
    }

    fn insert(&mut self, entry: RouteEntry) -> Result<(), RouteError> {
        let index = self.slot(entry.address)?;
        let slot = &mut self.routes[index];
        if slot.is_some() {
            return Err(RouteError::RouteExists(entry.address));
        }
        debug!(route = %entry, "Adding route");
        *slot = Some(entry);
        self.count += 1;
        Ok(())
    }

    /// Remove the route to `address`; succeeds when none exists
    pub fn delete(&mut self, address: Address) -> Result<(), RouteError> {
        let index = self.slot(address)?;
        if let Some(entry) = self.routes[index].take() {
            debug!(route = %entry, "Removed route");
            self.count -= 1;
        }
        Ok(())
    }

    /// Interface leading to `address`
    pub fn lookup(&self, address: Address) -> Result<InterfaceId, RouteError> {
        self.get(address)
            .map(|entry| entry.interface)
            .ok_or(RouteError::NoRoute(address))
    }

    /// Full route entry for `address`
    pub fn get(&self, address: Address) -> Option<&RouteEntry> {
        let index = self.slot(address).ok()?;
        self.routes[index].as_ref()
    }

    /// Iterate over all routes in address order
    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.routes.iter().flatten()
    }

    /// Number of routes
    pub fn len(&self) -> usize {
        self.count
    }

    /// True when the table holds no routes
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Remove every route
    pub fn clear(&mut self) {
        self.routes.iter_mut().for_each(|slot| *slot = None);
        self.count = 0;
    }

    /// Remove every route through `interface`, returning how many were dropped
    pub fn remove_interface(&mut self, interface: InterfaceId) -> usize {
        let mut removed = 0;
        for slot in self.routes.iter_mut() {
            if slot.is_some_and(|entry| entry.interface == interface) {
                *slot = None;
                removed += 1;
            }
        }
        self.count -= removed;
        if removed > 0 {
            debug!(%interface, removed, "Removed routes for interface");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_lookup() {
        let mut table = RoutingTable::new(16);
        table.add(Address(3), InterfaceId(0)).unwrap();
        table.add_with_hops(Address(4), InterfaceId(1), 2).unwrap();

        assert_eq!(table.lookup(Address(3)), Ok(InterfaceId(0)));
        assert_eq!(table.lookup(Address(4)), Ok(InterfaceId(1)));
        assert_eq!(table.get(Address(4)).unwrap().hops, Some(2));
        assert_eq!(table.len(), 2);
        assert!(!table.is_empty());
    }

    #[test]
    fn test_lookup_missing() {
        let table = RoutingTable::new(16);
        assert_eq!(table.lookup(Address(9)), Err(RouteError::NoRoute(Address(9))));
        assert!(table.get(Address::BROADCAST).is_none());
    }

    #[test]
    fn test_duplicate_route() {
        let mut table = RoutingTable::new(16);
        table.add(Address(3), InterfaceId(0)).unwrap();
        assert_eq!(
            table.add(Address(3), InterfaceId(1)),
            Err(RouteError::RouteExists(Address(3)))
        );
        assert_eq!(table.lookup(Address(3)), Ok(InterfaceId(0)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_reserved_and_out_of_range_addresses() {
        let mut table = RoutingTable::new(16);
        assert_eq!(
            table.add(Address::BROADCAST, InterfaceId(0)),
            Err(RouteError::BadAddress(Address::BROADCAST))
        );
        assert_eq!(
            table.add(Address::INVALID, InterfaceId(0)),
            Err(RouteError::BadAddress(Address::INVALID))
        );
        assert_eq!(
            table.add(Address(16), InterfaceId(0)),
            Err(RouteError::BadAddress(Address(16)))
        );
        assert_eq!(
            table.delete(Address::INVALID),
            Err(RouteError::BadAddress(Address::INVALID))
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_delete() {
        let mut table = RoutingTable::new(16);
        table.add(Address(3), InterfaceId(0)).unwrap();
        table.delete(Address(3)).unwrap();
        assert_eq!(table.lookup(Address(3)), Err(RouteError::NoRoute(Address(3))));

        // Deleting an absent route is not an error
        table.delete(Address(3)).unwrap();
        assert!(table.is_empty());

        table.add(Address(3), InterfaceId(2)).unwrap();
        assert_eq!(table.lookup(Address(3)), Ok(InterfaceId(2)));
    }

    #[test]
    fn test_iter_in_address_order() {
        let mut table = RoutingTable::default();
        table.add(Address(9), InterfaceId(1)).unwrap();
        table.add(Address(2), InterfaceId(0)).unwrap();
        table.add(Address(5), InterfaceId(1)).unwrap();

        let addrs: Vec<_> = table.iter().map(|r| r.address).collect();
        assert_eq!(addrs, vec![Address(2), Address(5), Address(9)]);
    }

    #[test]
    fn test_remove_interface() {
        let mut table = RoutingTable::default();
        table.add(Address(2), InterfaceId(0)).unwrap();
        table.add(Address(3), InterfaceId(1)).unwrap();
        table.add(Address(4), InterfaceId(1)).unwrap();

        assert_eq!(table.remove_interface(InterfaceId(1)), 2);
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup(Address(2)), Ok(InterfaceId(0)));
        assert_eq!(table.remove_interface(InterfaceId(7)), 0);
    }

    #[test]
    fn test_clear() {
        let mut table = RoutingTable::default();
        table.add(Address(2), InterfaceId(0)).unwrap();
        table.add(Address(3), InterfaceId(0)).unwrap();
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.iter().count(), 0);
    }

    #[test]
    fn test_capacity_is_clamped() {
        let table = RoutingTable::new(1000);
        assert_eq!(table.capacity(), 256);
        assert_eq!(RoutingTable::default().capacity(), DEFAULT_MAX_NODES);
    }
}
