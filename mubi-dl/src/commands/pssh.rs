use crate::config::PsshLayout;
use anyhow::Result;
use clap::Args;
use wv_pssh::{KeyId, PsshBox};

/// Print the base64 widevine pssh box for a key id.
#[derive(Args, Clone, Debug)]
pub struct Pssh {
    /// Key id as 32 hex characters, uuid style hyphens are allowed.
    #[arg(required = true, value_name = "KID")]
    pub kid: String,

    /// Data layout of the box.
    #[arg(long, value_enum, default_value_t = PsshLayout::Raw)]
    pub layout: PsshLayout,
}

impl Pssh {
    pub fn execute(self) -> Result<()> {
        let kid = KeyId::parse(&self.kid)?;
        println!("{}", PsshBox::with_payload(kid, self.layout.into()).to_base64());
        Ok(())
    }
}
