/// A join-semilattice: replicated state that converges by merging.
///
/// Replicas update independently and exchange whole states. Merging any two
/// states yields their least upper bound, so every replica that has seen the
/// same set of states holds the same value, no matter in which order or how
/// many times those states arrived.
///
/// # Laws
///
/// - **Commutative:** `a ⊔ b == b ⊔ a`
/// - **Associative:** `(a ⊔ b) ⊔ c == a ⊔ (b ⊔ c)`
/// - **Idempotent:** `a ⊔ a == a`
/// - **Inflationary:** `a ⊔ b >= a`, merging never loses an update
pub trait Crdt {
    /// Join `other` into `self`.
    fn merge(&mut self, other: &Self);
}
