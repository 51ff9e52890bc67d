use crate::app::{ErrorCollector, NanorssError, Result};
use crate::domain::user::normalize_username;
use crate::domain::User;
use crate::store::keys;
use crate::store::{index, Database};

impl Database {
    pub fn get_user(&self, username: &str) -> Result<Option<User>> {
        let user: Option<User> = self.get_json(&keys::user_key(username))?;
        Ok(user.map(|mut user| {
            user.username = username.to_string();
            user
        }))
    }

    /// Saves `user`, applying a staged rename if there is one.
    ///
    /// A rename fails with [`NanorssError::Conflict`] when the new username is
    /// taken, leaving the store and `user` unchanged.
    pub fn save_user(&self, user: &mut User) -> Result<()> {
        let username = normalize_username(&user.username)?;
        match user.pending_username().map(str::to_string) {
            None => self.put_user(&username, user),
            Some(new_username) => {
                self.rename_user(&username, &new_username, user)?;
                user.take_pending_username();
                user.username = new_username;
                Ok(())
            }
        }
    }

    fn put_user(&self, username: &str, user: &User) -> Result<()> {
        let user_key = keys::user_key(username);
        let value = serde_json::to_vec(user)?;
        self.in_transaction(&[user_key.clone(), keys::USERS_INDEX.to_vec()], |tx| {
            tx.put(user_key.clone(), value);
            index::add(tx, keys::USERS_INDEX, username.as_bytes())
        })
    }

    fn rename_user(&self, old: &str, new: &str, user: &User) -> Result<()> {
        let old_key = keys::user_key(old);
        let new_key = keys::user_key(new);
        let old_index = keys::read_status_index_key(old);
        let new_index = keys::read_status_index_key(new);
        let value = serde_json::to_vec(user)?;

        let lock_keys = [
            old_key.clone(),
            new_key.clone(),
            old_index.clone(),
            new_index.clone(),
            keys::USERS_INDEX.to_vec(),
        ];
        let moved = self.in_transaction(&lock_keys, |tx| {
            if tx.contains(&new_key)? {
                return Err(NanorssError::Conflict(new.to_string()));
            }

            let read_items = index::members(tx, &old_index)?;
            for item_key in &read_items {
                tx.delete(keys::read_status_key(old, item_key));
                tx.put(keys::read_status_key(new, item_key), Vec::new());
                index::add(tx, &new_index, item_key)?;
            }
            tx.delete(old_index.clone());

            tx.put(new_key.clone(), value);
            tx.delete(old_key.clone());
            index::remove(tx, keys::USERS_INDEX, old.as_bytes())?;
            index::add(tx, keys::USERS_INDEX, new.as_bytes())?;
            Ok(read_items.len())
        })?;

        tracing::info!(
            "Renamed user {} to {} ({} read items moved)",
            old,
            new,
            moved
        );
        Ok(())
    }

    /// Every user listed in the users index.
    pub fn read_all_users(&self) -> Result<Vec<User>> {
        let names = self.usernames()?;

        let mut errors = ErrorCollector::new();
        let mut users = Vec::with_capacity(names.len());
        for name in names {
            if let Some(Some(user)) = errors.record(self.get_user(&name)) {
                users.push(user);
            }
        }
        errors.finish()?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved_user(db: &Database, name: &str) -> User {
        let mut user = User::new(name).unwrap();
        user.opml = format!("<opml><body><outline xmlUrl=\"http://{}\"/></body></opml>", name);
        db.save_user(&mut user).unwrap();
        user
    }

    #[test]
    fn test_save_and_get_user() {
        let db = Database::in_memory().unwrap();
        let mut user = User::new("user01").unwrap();
        user.set_password("pass1").unwrap();
        db.save_user(&mut user).unwrap();

        let loaded = db.get_user("user01").unwrap().unwrap();
        assert_eq!(loaded.username, "user01");
        assert!(loaded.validate_password("pass1"));
        assert!(!loaded.validate_password("pass2"));
        assert!(db.get_user("nobody").unwrap().is_none());
    }

    #[test]
    fn test_empty_username_rejected() {
        let db = Database::in_memory().unwrap();
        let mut user = User::default();
        assert!(matches!(
            db.save_user(&mut user),
            Err(NanorssError::Invalid(_))
        ));
    }

    #[test]
    fn test_read_all_users_lists_each_once() {
        let db = Database::in_memory().unwrap();
        saved_user(&db, "user01");
        saved_user(&db, "user02");
        saved_user(&db, "user01");

        let names: Vec<_> = db
            .read_all_users()
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["user01", "user02"]);
    }

    #[test]
    fn test_rename_moves_record() {
        let db = Database::in_memory().unwrap();
        let mut user = saved_user(&db, "user01");
        let opml = user.opml.clone();

        user.set_username("user03").unwrap();
        db.save_user(&mut user).unwrap();

        assert_eq!(user.username, "user03");
        assert!(user.pending_username().is_none());
        assert!(db.get_user("user01").unwrap().is_none());
        assert_eq!(db.get_user("user03").unwrap().unwrap().opml, opml);

        let names: Vec<_> = db
            .read_all_users()
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["user03"]);
    }

    #[test]
    fn test_rename_to_existing_user_conflicts() {
        let db = Database::in_memory().unwrap();
        let mut user = saved_user(&db, "user01");
        saved_user(&db, "user02");

        user.set_username("user02").unwrap();
        let err = db.save_user(&mut user).unwrap_err();
        assert!(matches!(err, NanorssError::Conflict(ref name) if name == "user02"));

        assert_eq!(user.username, "user01");
        assert_eq!(user.pending_username(), Some("user02"));
        assert!(db.get_user("user01").unwrap().is_some());
        assert_eq!(
            db.get_user("user02").unwrap().unwrap().opml,
            "<opml><body><outline xmlUrl=\"http://user02\"/></body></opml>"
        );
    }
}
