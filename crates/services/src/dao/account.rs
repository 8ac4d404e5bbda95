use bson::doc;
use mongodb::Database;
use meetscribe_db::models::{Account, ApiToken};

use super::base::{BaseDao, DaoResult};

pub struct AccountDao {
    pub base: BaseDao<Account>,
    tokens: BaseDao<ApiToken>,
}

impl AccountDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Account::COLLECTION),
            tokens: BaseDao::new(db, ApiToken::COLLECTION),
        }
    }

    /// Resolves an API token to its account. Returns `None` for unknown
    /// tokens; the caller decides whether that is a 401 or a dropped event.
    pub async fn by_token(&self, token: &str) -> DaoResult<Option<Account>> {
        let Some(api_token) = self.tokens.find_one(doc! { "token": token }).await? else {
            return Ok(None);
        };
        self.base
            .find_one(doc! { "_id": api_token.account_id })
            .await
    }
}
