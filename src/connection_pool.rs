use diesel::{Connection, ConnectionError, PgConnection};
use mobc::{async_trait, Manager, Pool};

use crate::configuration::Secret;

pub struct PgConnectionManager {
    database_url: Secret,
}

#[async_trait]
impl Manager for PgConnectionManager {
    type Connection = PgConnection;
    type Error = ConnectionError;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        PgConnection::establish(self.database_url.expose())
    }

    async fn check(&self, conn: Self::Connection) -> Result<Self::Connection, Self::Error> {
        Ok(conn)
    }
}

pub fn establish_connection_pool(database_url: Secret) -> Pool<PgConnectionManager> {
    Pool::new(PgConnectionManager { database_url })
}
