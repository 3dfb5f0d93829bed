//! SQLite database handle for the relaygate site.

relaygate_core::define_database!(SiteDatabase, "Site database migrations complete");

impl std::fmt::Debug for SiteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteDatabase")
            .field("connections", &self.pool().size())
            .finish()
    }
}
