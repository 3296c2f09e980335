// ABOUTME: Interactive terminal wizard for initializing a new wiki instance
// ABOUTME: Collects identity, domain, language, and SMTP settings with validation

use crate::config::{SmtpSettings, WikiSettings};
use crate::utils::{validate_domain, validate_wiki_name};
use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password, Select};

/// Languages offered by the wizard; any valid code can still be passed by flag
pub const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("de", "Deutsch"),
    ("fr", "Français"),
    ("es", "Español"),
    ("it", "Italiano"),
    ("nl", "Nederlands"),
    ("pl", "Polski"),
    ("pt", "Português"),
    ("ru", "Русский"),
    ("zh", "中文"),
];

/// Pre-filled answers from CLI flags; anything left `None` is prompted for
#[derive(Debug, Clone, Default)]
pub struct InitPrefill {
    pub wiki_name: Option<String>,
    pub sitename: Option<String>,
    pub domain: Option<String>,
    pub language: Option<String>,
    pub admin_mail: Option<String>,
    /// Skip the SMTP prompts and the final confirmation
    pub assume_yes: bool,
}

fn validate_mail(mail: &str) -> Result<()> {
    let trimmed = mail.trim();
    if trimmed.is_empty()
        || !trimmed.contains('@')
        || trimmed.starts_with('@')
        || trimmed.ends_with('@')
        || trimmed.chars().any(|c| c.is_whitespace() || c == '\'')
    {
        bail!("'{}' is not a usable email address", crate::utils::sanitize_display(mail));
    }
    Ok(())
}

/// Collect settings for a new wiki instance
///
/// Walks the operator through name, title, domain, language, admin contact,
/// and an optional SMTP block, then shows a summary and asks for
/// confirmation before anything is written. Declining aborts with no side
/// effects.
pub fn collect_wiki_settings(prefill: &InitPrefill) -> Result<WikiSettings> {
    let theme = ColorfulTheme::default();

    let wiki_name = match &prefill.wiki_name {
        Some(name) => {
            validate_wiki_name(name)?;
            name.clone()
        }
        None => Input::with_theme(&theme)
            .with_prompt("Wiki name (short identifier, e.g. 'engineering')")
            .validate_with(|input: &String| validate_wiki_name(input).map_err(|e| e.to_string()))
            .interact_text()
            .context("Failed to read wiki name")?,
    };

    let sitename = match &prefill.sitename {
        Some(sitename) => sitename.clone(),
        None => Input::with_theme(&theme)
            .with_prompt("Display title")
            .default(wiki_name.clone())
            .interact_text()
            .context("Failed to read display title")?,
    };

    let domain = match &prefill.domain {
        Some(domain) => {
            validate_domain(domain)?;
            domain.clone()
        }
        None => Input::with_theme(&theme)
            .with_prompt("Public domain (e.g. 'wiki.example.com')")
            .validate_with(|input: &String| validate_domain(input).map_err(|e| e.to_string()))
            .interact_text()
            .context("Failed to read domain")?,
    };

    let language = match &prefill.language {
        Some(language) => language.clone(),
        None => {
            let labels: Vec<String> = LANGUAGES
                .iter()
                .map(|(code, name)| format!("{} ({})", name, code))
                .collect();
            let index = Select::with_theme(&theme)
                .with_prompt("Content language")
                .items(&labels)
                .default(0)
                .interact()
                .context("Failed to read language selection")?;
            LANGUAGES[index].0.to_string()
        }
    };

    let admin_mail = match &prefill.admin_mail {
        Some(mail) => {
            validate_mail(mail)?;
            mail.clone()
        }
        None => Input::with_theme(&theme)
            .with_prompt("Administrator email")
            .validate_with(|input: &String| validate_mail(input).map_err(|e| e.to_string()))
            .interact_text()
            .context("Failed to read administrator email")?,
    };

    let smtp = if prefill.assume_yes {
        None
    } else {
        let wants_smtp = Confirm::with_theme(&theme)
            .with_prompt("Configure outbound SMTP mail?")
            .default(false)
            .interact()
            .context("Failed to read SMTP choice")?;

        if wants_smtp {
            Some(collect_smtp_settings(&theme, &admin_mail)?)
        } else {
            None
        }
    };

    let settings = WikiSettings::new(wiki_name, sitename, domain, language, admin_mail, smtp)?;

    println!();
    println!("========================================");
    println!("New Wiki Instance Summary");
    println!("========================================");
    println!();
    println!("  Name:       {}", settings.name);
    println!("  Title:      {}", settings.sitename);
    println!("  URL:        {}", settings.server_url());
    println!("  Language:   {}", settings.language);
    println!("  Admin:      {}", settings.admin_mail);
    println!("  Database:   {} (user {})", settings.db.database, settings.db.user);
    match &settings.smtp {
        Some(smtp) => println!("  SMTP:       {}:{} as {}", smtp.host, smtp.port, smtp.user),
        None => println!("  SMTP:       not configured"),
    }
    println!();
    println!("========================================");
    println!();

    if !prefill.assume_yes {
        let confirmed = Confirm::with_theme(&theme)
            .with_prompt("Create this wiki instance?")
            .default(true)
            .interact()
            .context("Failed to get confirmation")?;

        if !confirmed {
            tracing::warn!("⚠ User cancelled wiki initialization");
            bail!("Wiki initialization cancelled by user");
        }
    }

    Ok(settings)
}

fn collect_smtp_settings(theme: &ColorfulTheme, admin_mail: &str) -> Result<SmtpSettings> {
    let host: String = Input::with_theme(theme)
        .with_prompt("SMTP host")
        .interact_text()
        .context("Failed to read SMTP host")?;

    let port: u16 = Input::with_theme(theme)
        .with_prompt("SMTP port")
        .default(587u16)
        .interact_text()
        .context("Failed to read SMTP port")?;

    let user: String = Input::with_theme(theme)
        .with_prompt("SMTP user")
        .interact_text()
        .context("Failed to read SMTP user")?;

    let password = Password::with_theme(theme)
        .with_prompt("SMTP password")
        .interact()
        .context("Failed to read SMTP password")?;

    let sender: String = Input::with_theme(theme)
        .with_prompt("Sender address")
        .default(admin_mail.to_string())
        .validate_with(|input: &String| validate_mail(input).map_err(|e| e.to_string()))
        .interact_text()
        .context("Failed to read sender address")?;

    Ok(SmtpSettings {
        host,
        port,
        user,
        password,
        sender,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mail_validation() {
        assert!(validate_mail("admin@example.com").is_ok());
        assert!(validate_mail("a@b").is_ok());

        assert!(validate_mail("").is_err());
        assert!(validate_mail("no-at-sign").is_err());
        assert!(validate_mail("@example.com").is_err());
        assert!(validate_mail("admin@").is_err());
        assert!(validate_mail("admin @example.com").is_err());
        assert!(validate_mail("admin'@example.com").is_err());
    }

    #[test]
    fn fully_prefilled_wizard_needs_no_terminal() {
        let prefill = InitPrefill {
            wiki_name: Some("engineering".to_string()),
            sitename: Some("Engineering".to_string()),
            domain: Some("eng.example.com".to_string()),
            language: Some("en".to_string()),
            admin_mail: Some("admin@example.com".to_string()),
            assume_yes: true,
        };

        let settings = collect_wiki_settings(&prefill).unwrap();
        assert_eq!(settings.name, "engineering");
        assert_eq!(settings.smtp, None);
        assert_eq!(settings.db.database, "engineering");
    }

    #[test]
    fn prefilled_invalid_name_is_rejected() {
        let prefill = InitPrefill {
            wiki_name: Some("Not A Name".to_string()),
            sitename: Some("X".to_string()),
            domain: Some("x.example.com".to_string()),
            language: Some("en".to_string()),
            admin_mail: Some("a@b.com".to_string()),
            assume_yes: true,
        };
        assert!(collect_wiki_settings(&prefill).is_err());
    }
}
