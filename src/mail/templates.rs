use super::Email;

const SIGNATURE: &str = "Oral Cancer AI Team";

fn wrap(inner: &str) -> String {
    format!(
        r#"<html><body style="font-family:sans-serif; color:#333">{inner}<br/><p>Regards,<br/>{SIGNATURE}</p></body></html>"#
    )
}

pub fn otp_verification(to: &str, name: &str, otp: &str, ttl_minutes: i64) -> Email {
    Email {
        subject: "Your OTP Verification Code".into(),
        to: vec![to.to_string()],
        body: format!(
            "Hello {name},\n\nYour OTP code is: {otp}\n\nIt will expire in {ttl_minutes} minutes.\n\nRegards,\n{SIGNATURE}"
        ),
        html: Some(wrap(&format!(
            r#"<h2>OTP Verification</h2><p>Hello <b>{name}</b>,</p><p>Your OTP code is:</p><h3 style="color:#007BFF;">{otp}</h3><p>This code will expire in {ttl_minutes} minutes.</p>"#
        ))),
        ..Default::default()
    }
}

pub fn otp_resend(to: &str, name: &str, otp: &str, ttl_minutes: i64) -> Email {
    Email {
        subject: "Your New OTP Verification Code".into(),
        to: vec![to.to_string()],
        body: format!(
            "Hello {name},\n\nYour new OTP code is: {otp}\n\nIt will expire in {ttl_minutes} minutes.\n\nRegards,\n{SIGNATURE}"
        ),
        html: Some(wrap(&format!(
            r#"<p>Hello <b>{name}</b>,</p><p>Your new OTP is <b style="color:#007BFF;">{otp}</b>.</p><p>It will expire in {ttl_minutes} minutes.</p>"#
        ))),
        ..Default::default()
    }
}

pub fn counselor_credentials(to: &str, name: &str, password: &str) -> Email {
    Email {
        subject: "Your Counselor Account Credentials".into(),
        to: vec![to.to_string()],
        body: format!(
            "Hello {name},\n\nYour counselor account has been created successfully.\n\n\
             Login Email: {to}\nPassword: {password}\n\n\
             Please log in and change your password after first login.\n\nRegards,\n{SIGNATURE}"
        ),
        html: Some(wrap(&format!(
            r#"<h2>Welcome to Oral Cancer AI Platform</h2><p>Hello <b>{name}</b>,</p><p>Your counselor account has been created successfully.</p><p><b>Login Email:</b> {to}</p><p><b>Temporary Password:</b> <span style="color:#007BFF;">{password}</span></p><p>Please log in and change your password immediately.</p>"#
        ))),
        ..Default::default()
    }
}

/// Sent to a triage subject whose account was opened by staff during upload.
pub fn subject_account(to: &str, name: &str, password: &str) -> Email {
    Email {
        subject: "Your Account Has Been Created".into(),
        to: vec![to.to_string()],
        body: format!(
            "Hello {name},\n\nAn account was created for you so you can view your screening results.\n\n\
             Login Email: {to}\nPassword: {password}\n\n\
             Please log in and change your password.\n\nRegards,\n{SIGNATURE}"
        ),
        html: Some(wrap(&format!(
            r#"<h2>Your account is ready</h2><p>Hello <b>{name}</b>,</p><p>An account was created for you so you can view your screening results.</p><p><b>Login Email:</b> {to}</p><p><b>Password:</b> <span style="color:#007BFF;">{password}</span></p><p>Please log in and change your password.</p>"#
        ))),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_carry_secret_in_both_parts() {
        let email = otp_verification("a@x.io", "Ada", "123456", 10);
        assert_eq!(email.to, ["a@x.io"]);
        assert!(email.body.contains("123456"));
        assert!(email.body.contains("10 minutes"));
        assert!(email.html.as_deref().unwrap().contains("123456"));

        let email = subject_account("s@x.io", "Sam", "pw12345678");
        assert!(email.body.contains("pw12345678"));
        assert!(email.html.unwrap().contains("s@x.io"));
    }
}
