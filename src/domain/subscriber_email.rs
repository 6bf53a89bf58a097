use validator::validate_email;

const LOCAL_PART_SYMBOLS: [char; 5] = ['.', '_', '%', '+', '-'];
const DOMAIN_SYMBOLS: [char; 2] = ['.', '-'];
const MIN_TLD_LENGTH: usize = 2;

/// An address accepted by the subscription form. The submitted casing is kept,
/// uniqueness is decided on the lowercase form (see [`SubscriberEmail::normalized`]).
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubscriberEmail(String);

impl SubscriberEmail {
    pub fn parse(email: String) -> Result<SubscriberEmail, String> {
        if !has_basic_shape(&email) || !validate_email(email.as_str()) {
            return Err(format!("{} email is not valid", email));
        }

        Ok(Self(email))
    }

    pub fn normalized(&self) -> String {
        self.0.to_lowercase()
    }
}

// local@domain.tld where local is [A-Za-z0-9._%+-]+, domain is [A-Za-z0-9.-]+
// and the final label is at least two ASCII letters.
fn has_basic_shape(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };

    let local_is_valid = !local.is_empty()
        && local
            .chars()
            .all(|char| char.is_ascii_alphanumeric() || LOCAL_PART_SYMBOLS.contains(&char));
    let host_is_valid = !host.is_empty()
        && host
            .chars()
            .all(|char| char.is_ascii_alphanumeric() || DOMAIN_SYMBOLS.contains(&char));
    let tld_is_valid =
        tld.len() >= MIN_TLD_LENGTH && tld.chars().all(|char| char.is_ascii_alphabetic());

    local_is_valid && host_is_valid && tld_is_valid
}

impl AsRef<str> for SubscriberEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriberEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
