use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::{
    db, rules,
    state::{AppState, MailConfig},
};

pub const NEW_EVENTS_SUBJECT: &str = "Neue Einsätze zum Einbuchen";
pub const NEW_EVENTS_BODY: &str = "Hallo,\n\n\
es wurden neue Einsätze zum Einbuchen im Online-Portal eingestellt.\n\n\
Bitte die Rückmeldefrist beachten.\n\n\
Viele Grüße\nCV Planung\n";

type MailError = Box<dyn std::error::Error + Send + Sync>;

/// Sends a plain text mail via SMTP. Missing configuration or a missing
/// recipient address is a silent no-op, not an error.
pub async fn send_mail(
    config: &MailConfig,
    to_addr: &str,
    subject: &str,
    body: &str,
) -> Result<(), MailError> {
    let to_addr = to_addr.trim();
    if to_addr.is_empty() || !config.enabled() {
        return Ok(());
    }

    let message = Message::builder()
        .from(config.from.parse()?)
        .to(to_addr.parse()?)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())?;

    let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        .port(config.port)
        .credentials(Credentials::new(config.user.clone(), config.pass.clone()))
        .build();

    transport.send(message).await?;
    Ok(())
}

/// Mail body for a changed roster entry. Only the fields that actually
/// changed get their own line; the base event facts are always included.
pub fn build_change_mail(
    employee_name: &str,
    event_title: &str,
    event_start: &str,
    ort: &str,
    dienstkleidung: &str,
    new_start_time: &str,
    new_remark: &str,
) -> String {
    let date_de = rules::format_date_de(event_start).unwrap_or_else(|| "TT.MM.JJJJ".to_string());

    let mut lines = vec![
        format!("Hallo {employee_name},"),
        String::new(),
        format!("es gibt eine Aktualisierung zu deinem Einsatz am {date_de}."),
        String::new(),
    ];

    let start_time = new_start_time.trim();
    let remark = new_remark.trim();
    if !start_time.is_empty() {
        lines.push(format!("Neue Startzeit: {start_time} ✅"));
    }
    if !remark.is_empty() {
        lines.push(format!("Neue Bemerkung: {remark} ✅"));
    }

    let title = some_or_dash(event_title);
    let dienst = some_or_dash(dienstkleidung);
    let location = some_or_dash(ort);

    lines.extend([
        String::new(),
        format!("Einsatz:  {title}"),
        format!("Dienstkleidung: {dienst}"),
        format!("Ort: {location}"),
        String::new(),
        "Viele Grüße".to_string(),
        "CV Planung".to_string(),
    ]);

    lines.join("\n")
}

fn some_or_dash(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        "-"
    } else {
        trimmed
    }
}

/// Notifies an employee that a manager touched their roster entry. Any
/// failure is logged and swallowed; the parent request must not break over
/// a mail problem.
pub async fn notify_entry_change(
    state: &AppState,
    event_id: &str,
    username: &str,
    new_start_time: &str,
    new_remark: &str,
) {
    let Some(user) = db::fetch_user(&state.db, username).await else {
        return;
    };
    let Some(event) = db::fetch_event(&state.db, event_id).await else {
        return;
    };

    let email = user.email.clone().unwrap_or_default();
    if email.trim().is_empty() {
        return;
    }

    let employee_name = {
        let full_name = user.full_name();
        if full_name.is_empty() {
            username.to_string()
        } else {
            full_name
        }
    };

    let title = event.title.clone().unwrap_or_default();
    let title = if title.trim().is_empty() { "Einsatz" } else { title.trim() };
    let subject = format!("Änderung zu deinem Einsatz: {title}");
    let event_start = event
        .start
        .clone()
        .unwrap_or_default()
        .trim()
        .replace('T', " ");

    let body = build_change_mail(
        &employee_name,
        title,
        &event_start,
        event.ort.as_deref().unwrap_or(""),
        event.dienstkleidung.as_deref().unwrap_or(""),
        new_start_time,
        new_remark,
    );

    if let Err(err) = send_mail(&state.mail, email.trim(), &subject, &body).await {
        log::warn!("Mail send failed: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_mail_includes_only_changed_lines() {
        let body = build_change_mail(
            "Anna Muster",
            "Stadtfest",
            "2024-05-01 09:00",
            "Rathausplatz",
            "Schwarz",
            "10:30",
            "",
        );
        assert!(body.contains("Hallo Anna Muster,"));
        assert!(body.contains("am 01.05.2024."));
        assert!(body.contains("Neue Startzeit: 10:30 ✅"));
        assert!(!body.contains("Neue Bemerkung"));
        assert!(body.contains("Einsatz:  Stadtfest"));
        assert!(body.contains("Dienstkleidung: Schwarz"));
        assert!(body.contains("Ort: Rathausplatz"));
        assert!(body.ends_with("Viele Grüße\nCV Planung"));
    }

    #[test]
    fn change_mail_keeps_placeholder_for_broken_start() {
        let body = build_change_mail("Ben", "Messe", "irgendwann", "", "", "", "Bitte früher da sein");
        assert!(body.contains("am TT.MM.JJJJ."));
        assert!(body.contains("Neue Bemerkung: Bitte früher da sein ✅"));
        assert!(body.contains("Ort: -"));
    }

    #[actix_web::test]
    async fn send_mail_is_a_noop_without_config() {
        let config = MailConfig {
            host: "smtp.example.org".to_string(),
            port: 587,
            user: String::new(),
            pass: String::new(),
            from: String::new(),
        };
        // No credentials configured: must not error, must not try to send.
        send_mail(&config, "someone@example.org", "s", "b").await.unwrap();
        send_mail(&config, "  ", "s", "b").await.unwrap();
    }
}
