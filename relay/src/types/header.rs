/// The minimal restart descriptor for a replicated event.
///
/// A header is everything the persistence layer needs to resume replication
/// without a gap or a duplicate. Headers are small and cloned freely so that
/// events themselves can be released as soon as they are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Globally increasing transaction sequence number.
    pub seqno: u64,
    /// Intra-transaction fragment index.
    pub fragno: u32,
    /// Whether this fragment closes its transaction.
    pub last_frag: bool,
    /// Opaque upstream position string.
    pub event_id: String,
    /// Identifier of the upstream server the event originated from.
    pub source_id: String,
}
