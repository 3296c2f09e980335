// ABOUTME: Renders BlueSpice pre-init and post-init PHP settings files
// ABOUTME: Escapes every interpolated value into PHP single-quoted literals

use crate::config::WikiSettings;

/// Sentinel line guarding the managed OpenID Connect block
///
/// Appending the block is idempotent: when the sentinel is already present
/// in `post-init-settings.php`, the installer leaves the file alone.
pub const OIDC_SENTINEL: &str = "// managed-block: openid-connect";

/// Render a value as a PHP single-quoted string literal
///
/// Only backslash and the single quote are meaningful inside PHP
/// single-quoted strings; escaping those two is sufficient to keep SMTP
/// passwords and OAuth secrets from breaking out of the literal.
pub fn php_single_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Render `pre-init-settings.php` — applied before MediaWiki core loads
///
/// Carries identity and database wiring: everything the installer and every
/// later maintenance run must agree on.
pub fn render_pre_init(wiki: &WikiSettings, db_host: &str) -> String {
    format!(
        "<?php\n\
         // Generated for wiki instance {name}. Do not edit by hand;\n\
         // re-run the farm tooling to change these values.\n\
         $GLOBALS['wgSitename'] = {sitename};\n\
         $GLOBALS['wgServer'] = {server};\n\
         $GLOBALS['wgLanguageCode'] = {language};\n\
         $GLOBALS['wgDBserver'] = {db_host};\n\
         $GLOBALS['wgDBname'] = {db_name};\n\
         $GLOBALS['wgDBuser'] = {db_user};\n\
         $GLOBALS['wgDBpassword'] = {db_pass};\n",
        name = wiki.name,
        sitename = php_single_quoted(&wiki.sitename),
        server = php_single_quoted(&wiki.server_url()),
        language = php_single_quoted(&wiki.language),
        db_host = php_single_quoted(db_host),
        db_name = php_single_quoted(&wiki.db.database),
        db_user = php_single_quoted(&wiki.db.user),
        db_pass = php_single_quoted(&wiki.db.password),
    )
}

/// Render `post-init-settings.php` — applied after core initialization
///
/// Mail wiring lives here; the OIDC block is appended later by the OAuth
/// installer when requested.
pub fn render_post_init(wiki: &WikiSettings) -> String {
    let mut out = format!(
        "<?php\n\
         // Generated for wiki instance {name}.\n\
         $GLOBALS['wgEmergencyContact'] = {admin_mail};\n",
        name = wiki.name,
        admin_mail = php_single_quoted(&wiki.admin_mail),
    );

    match &wiki.smtp {
        Some(smtp) => {
            out.push_str(&format!(
                "$GLOBALS['wgPasswordSender'] = {sender};\n\
                 $GLOBALS['wgSMTP'] = [\n\
                 \t'host' => {host},\n\
                 \t'IDHost' => {id_host},\n\
                 \t'port' => {port},\n\
                 \t'auth' => true,\n\
                 \t'username' => {user},\n\
                 \t'password' => {pass},\n\
                 ];\n",
                sender = php_single_quoted(&smtp.sender),
                host = php_single_quoted(&format!("tls://{}", smtp.host)),
                id_host = php_single_quoted(&wiki.domain),
                port = smtp.port,
                user = php_single_quoted(&smtp.user),
                pass = php_single_quoted(&smtp.password),
            ));
        }
        None => {
            out.push_str(&format!(
                "$GLOBALS['wgPasswordSender'] = {sender};\n",
                sender = php_single_quoted(&wiki.admin_mail)
            ));
        }
    }

    out
}

/// Render the managed OpenID Connect configuration block
pub fn render_oidc_block(provider_url: &str, client_id: &str, client_secret: &str) -> String {
    format!(
        "\n{sentinel}\n\
         wfLoadExtension( 'PluggableAuth' );\n\
         wfLoadExtension( 'OpenIDConnect' );\n\
         $GLOBALS['wgPluggableAuth_Config'][] = [\n\
         \t'plugin' => 'OpenIDConnect',\n\
         \t'data' => [\n\
         \t\t'providerURL' => {provider},\n\
         \t\t'clientID' => {client_id},\n\
         \t\t'clientsecret' => {client_secret},\n\
         \t],\n\
         ];\n",
        sentinel = OIDC_SENTINEL,
        provider = php_single_quoted(provider_url),
        client_id = php_single_quoted(client_id),
        client_secret = php_single_quoted(client_secret),
    )
}

/// Append the OIDC block to an existing post-init file, once
///
/// Returns `None` when the sentinel shows the block was already appended.
pub fn append_oidc_block(existing: &str, block: &str) -> Option<String> {
    if existing.contains(OIDC_SENTINEL) {
        return None;
    }
    let mut out = existing.to_string();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(block);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DbCredentials, SmtpSettings};

    fn sample_wiki(smtp: Option<SmtpSettings>) -> WikiSettings {
        WikiSettings {
            name: "engineering".to_string(),
            sitename: "Engineering Wiki".to_string(),
            domain: "eng.example.com".to_string(),
            language: "en".to_string(),
            admin_mail: "admin@example.com".to_string(),
            smtp,
            db: DbCredentials {
                database: "engineering".to_string(),
                user: "engineering".to_string(),
                password: "Abc123".to_string(),
            },
        }
    }

    #[test]
    fn quoting_escapes_quote_and_backslash() {
        assert_eq!(php_single_quoted("plain"), "'plain'");
        assert_eq!(php_single_quoted("it's"), "'it\\'s'");
        assert_eq!(php_single_quoted("back\\slash"), "'back\\\\slash'");
    }

    #[test]
    fn injection_shaped_secret_stays_inert() {
        // A secret trying to close the literal and call PHP stays a string
        let hostile = "x'; system('id'); //";
        let quoted = php_single_quoted(hostile);
        assert_eq!(quoted, "'x\\'; system(\\'id\\'); //'");

        let mut wiki = sample_wiki(None);
        wiki.db.password = hostile.to_string();
        let rendered = render_pre_init(&wiki, "bluespice-database");
        assert!(rendered.contains("$GLOBALS['wgDBpassword'] = 'x\\'; system(\\'id\\'); //';"));
    }

    #[test]
    fn pre_init_carries_database_wiring() {
        let rendered = render_pre_init(&sample_wiki(None), "bluespice-database");
        assert!(rendered.starts_with("<?php\n"));
        assert!(rendered.contains("$GLOBALS['wgDBserver'] = 'bluespice-database';"));
        assert!(rendered.contains("$GLOBALS['wgDBname'] = 'engineering';"));
        assert!(rendered.contains("$GLOBALS['wgServer'] = 'https://eng.example.com';"));
        assert!(rendered.contains("$GLOBALS['wgLanguageCode'] = 'en';"));
    }

    #[test]
    fn post_init_with_smtp_renders_mail_block() {
        let rendered = render_post_init(&sample_wiki(Some(SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: 587,
            user: "mailer".to_string(),
            password: "p'ss".to_string(),
            sender: "wiki@example.com".to_string(),
        })));
        assert!(rendered.contains("'host' => 'tls://smtp.example.com',"));
        assert!(rendered.contains("'port' => 587,"));
        assert!(rendered.contains("'password' => 'p\\'ss',"));
        assert!(rendered.contains("$GLOBALS['wgPasswordSender'] = 'wiki@example.com';"));
    }

    #[test]
    fn post_init_without_smtp_has_no_mail_block() {
        let rendered = render_post_init(&sample_wiki(None));
        assert!(!rendered.contains("wgSMTP"));
        assert!(rendered.contains("$GLOBALS['wgPasswordSender'] = 'admin@example.com';"));
    }

    #[test]
    fn oidc_append_is_idempotent() {
        let base = render_post_init(&sample_wiki(None));
        let block = render_oidc_block("https://login.example.com", "wiki", "s3cret");

        let appended = append_oidc_block(&base, &block).unwrap();
        assert!(appended.contains("wfLoadExtension( 'OpenIDConnect' );"));
        assert!(appended.contains("'clientsecret' => 's3cret',"));

        // Second append is a no-op
        assert!(append_oidc_block(&appended, &block).is_none());
    }
}
