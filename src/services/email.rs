//! Email service for booking confirmations

use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use std::str::FromStr;

use crate::{
    config::EmailConfig,
    dates::{DATE_FORMAT, TIME_FORMAT},
    error::{AppError, AppResult},
    models::{reservation::Reservation, schedule::Schedule},
};

#[derive(Clone)]
pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Send the visitor a summary of a confirmed reservation.
    /// Does nothing when email is disabled.
    pub async fn send_reservation_confirmation(
        &self,
        to: &str,
        reservation: &Reservation,
        schedule: &Schedule,
    ) -> AppResult<()> {
        if !self.config.enabled {
            tracing::debug!("Email disabled, skipping confirmation for {}", reservation.id);
            return Ok(());
        }

        let subject = "Conferma prenotazione / Booking confirmation";
        let date = schedule.date.format(DATE_FORMAT);
        let time = schedule.window.offered_time().format(TIME_FORMAT);
        let amount = reservation.amount_total as f64 / 100.0;
        let body = format!(
            r#"
La tua prenotazione è confermata. / Your booking is confirmed.

Visita / Visit: {visit}
Data / Date: {date}
Ora / Time: {time}
Persone / People: {people}
Totale / Total: {amount:.2} {currency}

Codice / Reference: {reference}
"#,
            visit = reservation.visit_type,
            date = date,
            time = time,
            people = reservation.num_people,
            amount = amount,
            currency = reservation.currency.to_uppercase(),
            reference = reservation.id,
        );

        self.send_email(to, subject, &body).await
    }

    /// Generic email sending function
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let from_name = self.config.smtp_from_name.as_deref().unwrap_or("Papilio");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::Validation(format!("Invalid recipient address: {}", e)))?;

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(format!(
                                r#"<html><body><pre>{}</pre></body></html>"#,
                                body.replace('\n', "<br>")
                            )),
                    ),
            )
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))?;

        let mailer_builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AppError::Provider(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer_builder = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer_builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer_builder
        };

        let mailer = mailer_builder.build();

        // SmtpTransport is blocking
        tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::Internal(format!("Email task failed: {}", e)))?
            .map_err(|e| AppError::Provider(format!("Failed to send email: {}", e)))?;

        Ok(())
    }
}
