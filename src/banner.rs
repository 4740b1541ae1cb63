//! Fixed text spoken to users: the welcome banner, the help text and the
//! standard prompts.

pub const WELCOME: &str = "\nWelcome to Parley!\n\nA \"guest\" account is available.\n\n";

pub const HALF_DUPLEX_WARNING: &str =
    "Sorry, unable to suppress Go Aheads.  Must operate in half-duplex mode.\n\n";

pub const SHUTDOWN_WARNING: &str = "*** This server is about to shut down! ***\n\n";

pub const SIGNED_ON: &str =
    "\n\nWelcome to Parley.  Type \"/help\" for a list of commands.\n\n";

pub const END_OF_REVIEW: &str = "*** End of reviewed output. ***\n";

pub const LOGIN_PROMPT: &str = "login: ";
pub const PASSWORD_PROMPT: &str = "Password: ";
pub const NAME_PROMPT: &str = "Enter name: ";
pub const BLURB_PROMPT: &str = "Enter blurb: ";

pub const HELP: &str = "Currently known commands:\n\n\
/blurb -- set a descriptive blurb\n\
/bye -- leave Parley\n\
/clear -- clear the screen\n\
/date -- display current date and time\n\
/detach -- detach from this session without signing off\n\
/help -- gives this thrilling message\n\
/idle -- gives a short idle listing\n\
/send -- specify default sendlist\n\
/signal -- turns public/private signals on/off\n\
/unidle -- reset idle time (a single space does the same)\n\
/who -- gives a list of who is connected\n\
No other /commands are implemented yet. [except /why! :-)]\n\n\
There are two ways to specify a user to send a private message.  You can use\n\
either a '#' and the connection number for the user, or any substring of the\n\
user's name. (case-insensitive)  Follow either form with a semicolon or colon\n\
and the message. (e.g. \"#4;hi\", \"dev;hi\", ...)\n\n\
Any other line not beginning with a slash is simply sent to everyone.\n\n\
The following are recognized as smileys instead of as sendlists:\n\n\
\t:-) :-( :-P ;-) :_) :_( :) :( :P ;)\n\n";
